// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Seams between the deployer and the systems it drives

use crate::error::Result;
use crate::types::handles::AuthenticationMode;
use crate::types::resource::{HelmChart, ImageAsset, Manifest};
use crate::types::AccessEntry;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterState {
    Creating,
    Active,
    Updating,
    Deleting,
    Failed,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    InProgress,
    Successful,
    Failed(String),
    Cancelled,
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn cluster_state(&self, cluster: &str) -> Result<ClusterState>;

    async fn authentication_mode(&self, cluster: &str) -> Result<AuthenticationMode>;

    /// Start an authentication mode change, returning the update id
    async fn update_authentication_mode(
        &self,
        cluster: &str,
        mode: AuthenticationMode,
    ) -> Result<String>;

    async fn update_status(&self, cluster: &str, update_id: &str) -> Result<UpdateStatus>;

    /// Create the entry and associate its policy. An entry that already exists is not an error.
    async fn create_access_entry(&self, entry: &AccessEntry) -> Result<()>;
}

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build_and_push(&self, asset: &ImageAsset) -> Result<()>;
}

#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// Returns the number of objects applied
    async fn apply(&self, manifest: &Manifest) -> Result<usize>;
}

#[async_trait]
pub trait ChartInstaller: Send + Sync {
    async fn install(&self, chart: &HelmChart) -> Result<()>;
}
