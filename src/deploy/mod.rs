// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Executes the steps of a plan this tool owns, in deployment order.
//!
//! Network, IAM, KMS and the cluster itself belong to the external
//! reconciliation engine; the deployer waits for the cluster, upgrades its
//! authentication mode, publishes the image, binds access entries, applies
//! the workload manifest and installs the add-on charts.

pub mod auth_mode;
pub mod backend;
pub mod docker;
pub mod eks;
pub mod helm;

use crate::error::{Result, StackError};
use crate::plan::Plan;
use crate::types::{Resource, ResourceId, ResourceSpec};
use auth_mode::{ensure_authentication_mode, wait_for_cluster_active, AuthModeOutcome, PollSettings};
use backend::{ChartInstaller, ClusterApi, ImageBuilder, ManifestApplier};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy)]
pub struct DeployOptions {
    pub skip_build: bool,
    pub cluster_poll: PollSettings,
    pub auth_poll: PollSettings,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            skip_build: false,
            cluster_poll: PollSettings::cluster_active(),
            auth_poll: PollSettings::auth_mode(),
        }
    }
}

/// What happened to each resource of the plan
#[derive(Debug, Default)]
pub struct DeployReport {
    pub applied: Vec<ResourceId>,
    pub skipped: Vec<ResourceId>,
    pub awaited: Vec<ResourceId>,
    /// Left to the external engine
    pub delegated: Vec<ResourceId>,
}

enum Outcome {
    Applied,
    Skipped,
    Awaited,
    Delegated,
}

pub struct Deployer {
    cluster: Arc<dyn ClusterApi>,
    images: Arc<dyn ImageBuilder>,
    manifests: Arc<dyn ManifestApplier>,
    charts: Arc<dyn ChartInstaller>,
    options: DeployOptions,
}

impl Deployer {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        images: Arc<dyn ImageBuilder>,
        manifests: Arc<dyn ManifestApplier>,
        charts: Arc<dyn ChartInstaller>,
        options: DeployOptions,
    ) -> Self {
        Self {
            cluster,
            images,
            manifests,
            charts,
            options,
        }
    }

    /// Walk the plan in deployment order. The first failure aborts the run;
    /// nothing already applied is rolled back.
    #[instrument(skip(self, plan))]
    pub async fn deploy(&self, plan: &Plan) -> Result<DeployReport> {
        let order = plan.deployment_order();
        let mut report = DeployReport::default();

        let mut i = 0;
        while i < order.len() {
            if matches!(order[i].spec, ResourceSpec::HelmChart(_)) {
                // consecutive charts with no edges between them go out together
                let mut batch = vec![order[i]];
                let mut next = i + 1;
                while next < order.len()
                    && matches!(order[next].spec, ResourceSpec::HelmChart(_))
                    && batch
                        .iter()
                        .all(|b| !plan.graph().depends_on(&order[next].id, &b.id))
                {
                    batch.push(order[next]);
                    next += 1;
                }
                self.install_charts(plan, &batch).await?;
                report.applied.extend(batch.iter().map(|r| r.id.clone()));
                i = next;
                continue;
            }

            let resource = order[i];
            let outcome = self
                .step(resource)
                .await
                .map_err(|e| stage_error(plan, resource, e))?;
            let bucket = match outcome {
                Outcome::Applied => &mut report.applied,
                Outcome::Skipped => &mut report.skipped,
                Outcome::Awaited => &mut report.awaited,
                Outcome::Delegated => &mut report.delegated,
            };
            bucket.push(resource.id.clone());
            i += 1;
        }

        info!(
            "Deploy finished: {} applied, {} skipped, {} awaited, {} delegated",
            report.applied.len(),
            report.skipped.len(),
            report.awaited.len(),
            report.delegated.len()
        );
        Ok(report)
    }

    async fn step(&self, resource: &Resource) -> Result<Outcome> {
        match &resource.spec {
            ResourceSpec::EksCluster { name, .. } => {
                wait_for_cluster_active(self.cluster.as_ref(), name, self.options.cluster_poll)
                    .await?;
                Ok(Outcome::Awaited)
            }
            ResourceSpec::AuthModeUpdate {
                cluster_name,
                authentication_mode,
                ..
            } => {
                let outcome = ensure_authentication_mode(
                    self.cluster.as_ref(),
                    cluster_name,
                    *authentication_mode,
                    self.options.auth_poll,
                )
                .await?;
                Ok(match outcome {
                    AuthModeOutcome::AlreadySet(_) => Outcome::Skipped,
                    AuthModeOutcome::Updated { .. } => Outcome::Applied,
                })
            }
            ResourceSpec::ImageAsset(asset) => {
                if self.options.skip_build {
                    warn!("Skipping build of {}", asset.image);
                    return Ok(Outcome::Skipped);
                }
                self.images.build_and_push(asset).await?;
                Ok(Outcome::Applied)
            }
            ResourceSpec::AccessEntry(entry) => {
                self.cluster.create_access_entry(entry).await?;
                Ok(Outcome::Applied)
            }
            ResourceSpec::Manifest(manifest) => {
                let count = self.manifests.apply(manifest).await?;
                info!("Applied {} objects for {}", count, resource.id);
                Ok(Outcome::Applied)
            }
            _ => Ok(Outcome::Delegated),
        }
    }

    async fn install_charts(&self, plan: &Plan, batch: &[&Resource]) -> Result<()> {
        info!("Installing {} charts", batch.len());
        try_join_all(batch.iter().map(|resource| async move {
            match &resource.spec {
                ResourceSpec::HelmChart(chart) => self
                    .charts
                    .install(chart)
                    .await
                    .map_err(|e| stage_error(plan, resource, e)),
                _ => Ok(()),
            }
        }))
        .await?;
        Ok(())
    }
}

fn stage_error(plan: &Plan, resource: &Resource, source: StackError) -> StackError {
    StackError::Stage {
        stage: plan
            .stage_of(&resource.id)
            .map(|s| s.stack_name().to_string())
            .unwrap_or_else(|| resource.id.stack.clone()),
        resource: resource.id.to_string(),
        source: Box::new(source),
    }
}
