// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Client creation for the provisioned cluster

use crate::error::{Result, StackError};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config as KConfig};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Create a client for the target cluster.
///
/// An explicit kubeconfig file wins; otherwise the usual inference applies
/// (`KUBECONFIG`, `~/.kube/config`, in-cluster). `context` selects a
/// non-current context in either case.
#[instrument]
pub async fn create_client(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Client> {
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    let config = match (kubeconfig, context) {
        (Some(path), _) => {
            info!("Loading kubeconfig from {}", path.display());
            let parsed = Kubeconfig::read_from(path).map_err(|e| {
                StackError::KubeconfigError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            KConfig::from_custom_kubeconfig(parsed, &options)
                .await
                .map_err(|e| {
                    StackError::KubeconfigError(format!("Failed to create config: {}", e))
                })?
        }
        (None, Some(_)) => KConfig::from_kubeconfig(&options).await.map_err(|e| {
            StackError::KubeconfigError(format!("Failed to load context: {}", e))
        })?,
        (None, None) => KConfig::infer()
            .await
            .map_err(|e| StackError::KubeconfigError(format!("Failed to infer config: {}", e)))?,
    };
    debug!("Cluster endpoint: {}", config.cluster_url);

    Client::try_from(config)
        .map_err(|e| StackError::KubeconfigError(format!("Failed to create client: {}", e)))
}
