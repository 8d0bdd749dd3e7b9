// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Image builds through the docker CLI

use crate::deploy::backend::ImageBuilder;
use crate::error::{Result, StackError};
use crate::types::resource::ImageAsset;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Builds and pushes with the local docker client.
/// The client must already be logged in to the asset registry.
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    pub fn build_args(asset: &ImageAsset) -> Vec<String> {
        vec![
            "build".to_string(),
            "--platform".to_string(),
            asset.platform.clone(),
            "--tag".to_string(),
            asset.image.to_string(),
            asset.directory.display().to_string(),
        ]
    }

    pub fn push_args(asset: &ImageAsset) -> Vec<String> {
        vec!["push".to_string(), asset.image.to_string()]
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        debug!("Running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| StackError::ImageBuild(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StackError::ImageBuild(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.first().map(String::as_str).unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    #[instrument(skip(self, asset), fields(image = %asset.image))]
    async fn build_and_push(&self, asset: &ImageAsset) -> Result<()> {
        self.run(&Self::build_args(asset)).await?;
        info!("Built {}", asset.image);
        self.run(&Self::push_args(asset)).await?;
        info!("Pushed {}", asset.image);
        Ok(())
    }
}
