// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! EKS control plane calls through the AWS SDK

use crate::deploy::backend::{ClusterApi, ClusterState, UpdateStatus};
use crate::error::{Result, StackError};
use crate::types::handles::AuthenticationMode;
use crate::types::AccessEntry;
use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, SdkConfig};
use aws_sdk_eks::error::DisplayErrorContext;
use aws_sdk_eks::types::{
    AccessScope, AccessScopeType, AuthenticationMode as SdkAuthenticationMode, ClusterStatus,
    UpdateAccessConfigRequest, UpdateStatus as SdkUpdateStatus,
};
use aws_types::region::Region;
use tracing::{debug, info, instrument};

/// SDK configuration for the target region, falling back to the default provider chain
pub async fn sdk_config(region: &str) -> SdkConfig {
    let region_provider =
        RegionProviderChain::first_try(Some(Region::new(region.to_string()))).or_default_provider();
    aws_config::from_env().region(region_provider).load().await
}

fn to_sdk_mode(mode: AuthenticationMode) -> SdkAuthenticationMode {
    match mode {
        AuthenticationMode::ConfigMap => SdkAuthenticationMode::ConfigMap,
        AuthenticationMode::ApiAndConfigMap => SdkAuthenticationMode::ApiAndConfigMap,
        AuthenticationMode::Api => SdkAuthenticationMode::Api,
    }
}

fn from_sdk_mode(mode: &SdkAuthenticationMode) -> Result<AuthenticationMode> {
    match mode {
        SdkAuthenticationMode::ConfigMap => Ok(AuthenticationMode::ConfigMap),
        SdkAuthenticationMode::ApiAndConfigMap => Ok(AuthenticationMode::ApiAndConfigMap),
        SdkAuthenticationMode::Api => Ok(AuthenticationMode::Api),
        other => Err(StackError::Eks(format!(
            "unknown authentication mode {}",
            other.as_str()
        ))),
    }
}

fn from_sdk_state(status: &ClusterStatus) -> ClusterState {
    match status {
        ClusterStatus::Creating => ClusterState::Creating,
        ClusterStatus::Active => ClusterState::Active,
        ClusterStatus::Updating => ClusterState::Updating,
        ClusterStatus::Deleting => ClusterState::Deleting,
        ClusterStatus::Failed => ClusterState::Failed,
        other => ClusterState::Other(other.as_str().to_string()),
    }
}

fn eks_error<E>(action: &str, err: E) -> StackError
where
    E: std::error::Error,
{
    StackError::Eks(format!("{}: {}", action, DisplayErrorContext(err)))
}

pub struct EksClusterApi {
    client: aws_sdk_eks::Client,
}

impl EksClusterApi {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_eks::Client::new(config),
        }
    }

    async fn describe(&self, cluster: &str) -> Result<aws_sdk_eks::types::Cluster> {
        let output = self
            .client
            .describe_cluster()
            .name(cluster)
            .send()
            .await
            .map_err(|e| eks_error("DescribeCluster", e))?;
        output
            .cluster
            .ok_or_else(|| StackError::Eks(format!("cluster {} not described", cluster)))
    }
}

#[async_trait]
impl ClusterApi for EksClusterApi {
    async fn cluster_state(&self, cluster: &str) -> Result<ClusterState> {
        let described = self.describe(cluster).await?;
        Ok(described
            .status()
            .map(from_sdk_state)
            .unwrap_or_else(|| ClusterState::Other("unknown".to_string())))
    }

    async fn authentication_mode(&self, cluster: &str) -> Result<AuthenticationMode> {
        let described = self.describe(cluster).await?;
        match described
            .access_config()
            .and_then(|c| c.authentication_mode())
        {
            Some(mode) => from_sdk_mode(mode),
            // clusters created before access entries existed report nothing
            None => Ok(AuthenticationMode::ConfigMap),
        }
    }

    #[instrument(skip(self))]
    async fn update_authentication_mode(
        &self,
        cluster: &str,
        mode: AuthenticationMode,
    ) -> Result<String> {
        let output = self
            .client
            .update_cluster_config()
            .name(cluster)
            .access_config(
                UpdateAccessConfigRequest::builder()
                    .authentication_mode(to_sdk_mode(mode))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| eks_error("UpdateClusterConfig", e))?;

        let update_id = output
            .update()
            .and_then(|u| u.id())
            .ok_or_else(|| StackError::Eks("UpdateClusterConfig returned no update id".to_string()))?;
        info!("Requested {} on {}: update {}", mode, cluster, update_id);
        Ok(update_id.to_string())
    }

    async fn update_status(&self, cluster: &str, update_id: &str) -> Result<UpdateStatus> {
        let output = self
            .client
            .describe_update()
            .name(cluster)
            .update_id(update_id)
            .send()
            .await
            .map_err(|e| eks_error("DescribeUpdate", e))?;

        let Some(update) = output.update() else {
            return Err(StackError::Eks(format!("update {} not found", update_id)));
        };
        let status = match update.status() {
            Some(SdkUpdateStatus::Successful) => UpdateStatus::Successful,
            Some(SdkUpdateStatus::Failed) => {
                let reasons: Vec<String> = update
                    .errors()
                    .iter()
                    .filter_map(|e| e.error_message().map(str::to_string))
                    .collect();
                UpdateStatus::Failed(reasons.join("; "))
            }
            Some(SdkUpdateStatus::Cancelled) => UpdateStatus::Cancelled,
            _ => UpdateStatus::InProgress,
        };
        debug!("Update {} is {:?}", update_id, status);
        Ok(status)
    }

    #[instrument(skip(self, entry), fields(principal = %entry.principal_arn))]
    async fn create_access_entry(&self, entry: &AccessEntry) -> Result<()> {
        let created = self
            .client
            .create_access_entry()
            .cluster_name(&entry.cluster_name)
            .principal_arn(&entry.principal_arn)
            .set_kubernetes_groups(Some(entry.kubernetes_groups.clone()))
            .r#type(&entry.entry_type)
            .send()
            .await;

        match created {
            Ok(_) => info!("Created access entry on {}", entry.cluster_name),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_resource_in_use_exception() {
                    info!("Access entry on {} already exists", entry.cluster_name);
                } else {
                    return Err(eks_error("CreateAccessEntry", service_error));
                }
            }
        }

        self.client
            .associate_access_policy()
            .cluster_name(&entry.cluster_name)
            .principal_arn(&entry.principal_arn)
            .policy_arn(&entry.policy_arn)
            .access_scope(
                AccessScope::builder()
                    .r#type(AccessScopeType::Cluster)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| eks_error("AssociateAccessPolicy", e))?;
        Ok(())
    }
}
