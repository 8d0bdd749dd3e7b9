// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Server-side apply of rendered manifest objects

use crate::constants::FIELD_MANAGER;
use crate::deploy::backend::ManifestApplier;
use crate::error::{Result, StackError};
use crate::kubernetes::namespaces::ensure_namespace_exists;
use crate::types::resource::Manifest;
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::{pinned_kind, Scope};
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

const DEFAULT_NAMESPACE: &str = "default";

fn group_version_kind(object: &DynamicObject) -> Result<GroupVersionKind> {
    let Some(types) = &object.types else {
        return Err(StackError::ManifestParse(format!(
            "object {} has no apiVersion/kind",
            object.name_any()
        )));
    };
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/// Apply each object with server-side apply, in document order.
/// Namespaced objects without a namespace land in `default`.
#[instrument(skip(client, objects), fields(count = objects.len()))]
pub async fn apply_objects(client: &Client, objects: &[serde_json::Value]) -> Result<usize> {
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let mut ensured = BTreeSet::new();

    for value in objects {
        let object: DynamicObject = serde_json::from_value(value.clone())?;
        let gvk = group_version_kind(&object)?;
        let name = object.name_any();
        let (resource, capabilities) = pinned_kind(client, &gvk).await?;

        let api: Api<DynamicObject> = match capabilities.scope {
            Scope::Namespaced => {
                let namespace = object
                    .namespace()
                    .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
                if ensured.insert(namespace.clone()) {
                    ensure_namespace_exists(client, &namespace).await?;
                }
                Api::namespaced_with(client.clone(), &namespace, &resource)
            }
            Scope::Cluster => Api::all_with(client.clone(), &resource),
        };

        debug!("Applying {} {}", gvk.kind, name);
        api.patch(&name, &params, &Patch::Apply(&object)).await?;
    }

    info!("Applied {} objects", objects.len());
    Ok(objects.len())
}

/// Applies workload manifests through the Kubernetes API
pub struct KubeManifestApplier {
    client: Client,
}

impl KubeManifestApplier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestApplier for KubeManifestApplier {
    async fn apply(&self, manifest: &Manifest) -> Result<usize> {
        apply_objects(&self.client, &manifest.objects).await
    }
}
