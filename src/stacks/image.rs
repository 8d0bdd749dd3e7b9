// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ECR stack: the application image asset and the access entry that waits on it

use crate::config::Config;
use crate::constants::assets;
use crate::error::{Result, StackError};
use crate::plan::Stack;
use crate::types::resource::ImageAsset;
use crate::types::{
    AccessEntry, ClusterHandle, ImageReference, ResourceId, ResourceSpec, StageDescriptor,
};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

pub const DOCKERFILE: &str = "Dockerfile";

/// Logical id of the image asset
pub const IMAGE_ASSET: &str = "MyBuildImage";

/// Repository the bootstrap environment provides for container assets
pub fn asset_repository(account_id: &str, region: &str) -> String {
    format!(
        "{account}.dkr.ecr.{region}.amazonaws.com/cdk-{qualifier}-container-assets-{account}-{region}",
        account = account_id,
        region = region,
        qualifier = assets::QUALIFIER,
    )
}

/// SHA-256 over the target platform and every file of the build context.
/// Files are visited in path order and hashed with their relative path, so
/// the result only changes when the context does.
pub fn hash_build_context(dir: &Path) -> Result<String> {
    if !dir.join(DOCKERFILE).is_file() {
        return Err(StackError::ImageBuild(format!(
            "no {} in build context {}",
            DOCKERFILE,
            dir.display()
        )));
    }

    let mut hasher = Sha256::new();
    hasher.update(assets::PLATFORM.as_bytes());
    hasher.update([0u8]);

    let mut files = 0usize;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            StackError::ImageBuild(format!("cannot read build context {}: {}", dir.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(fs::read(entry.path())?);
        hasher.update([0u8]);
        files += 1;
    }

    let digest = hex::encode(hasher.finalize());
    debug!("Hashed {} files in {}: {}", files, dir.display(), digest);
    Ok(digest)
}

/// Declare the image stack. Returns the published image and the id of the
/// asset that builds it, which the workload manifest waits on.
#[instrument(skip(config, cluster), fields(context = %config.build_context.display()))]
pub fn provision(
    config: &Config,
    cluster: &ClusterHandle,
) -> Result<(Stack, ImageReference, ResourceId)> {
    let asset_hash = hash_build_context(&config.build_context)?;
    let image = ImageReference::new(
        &asset_repository(&config.account_id, &config.region),
        &asset_hash,
    )?;

    let mut stack = Stack::new(StageDescriptor::image());

    let asset = stack.add(
        IMAGE_ASSET,
        ResourceSpec::ImageAsset(ImageAsset {
            directory: config.build_context.clone(),
            platform: assets::PLATFORM.to_string(),
            asset_hash,
            image: image.clone(),
        }),
    )?;

    // ordered after the image build even though the two are unrelated
    let entry = stack.add(
        "MyCfnAccessEntry",
        ResourceSpec::AccessEntry(AccessEntry::cluster_admin(
            cluster.name(),
            &config.admin_principal_arn,
        )),
    )?;
    stack.add_dependency(&entry, &asset)?;
    stack.add_dependency(&entry, cluster.access_entry_dependency()?)?;

    info!("Image stack publishes {}", image);
    Ok((stack, image, asset))
}
