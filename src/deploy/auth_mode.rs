// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Waiting for the cluster and upgrading its authentication mode

use crate::constants::polling::{
    AUTH_MODE_TIMEOUT_SECS, CLUSTER_ACTIVE_TIMEOUT_SECS, POLL_INTERVAL_SECS,
    POLL_MAX_INTERVAL_SECS,
};
use crate::deploy::backend::{ClusterApi, ClusterState, UpdateStatus};
use crate::error::{Result, StackError};
use crate::types::handles::AuthenticationMode;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, instrument, warn};

/// Capped exponential backoff with an overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub fn cluster_active() -> Self {
        Self {
            interval: Duration::from_secs(POLL_INTERVAL_SECS),
            max_interval: Duration::from_secs(POLL_MAX_INTERVAL_SECS),
            timeout: Duration::from_secs(CLUSTER_ACTIVE_TIMEOUT_SECS),
        }
    }

    pub fn auth_mode() -> Self {
        Self {
            timeout: Duration::from_secs(AUTH_MODE_TIMEOUT_SECS),
            ..Self::cluster_active()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthModeOutcome {
    AlreadySet(AuthenticationMode),
    Updated { update_id: String },
}

/// Wait until the cluster reports ACTIVE.
/// Lookup errors are retried since the cluster may not be visible yet.
#[instrument(skip(api, poll))]
pub async fn wait_for_cluster_active(
    api: &dyn ClusterApi,
    cluster: &str,
    poll: PollSettings,
) -> Result<()> {
    let deadline = Instant::now() + poll.timeout;
    let mut interval = poll.interval;

    loop {
        match api.cluster_state(cluster).await {
            Ok(ClusterState::Active) => {
                info!("Cluster {} is active", cluster);
                return Ok(());
            }
            Ok(state @ (ClusterState::Failed | ClusterState::Deleting)) => {
                return Err(StackError::ClusterNotReady(format!(
                    "cluster {} is {:?}",
                    cluster, state
                )));
            }
            Ok(state) => {
                info!(
                    "Cluster {} is {:?}, waiting {:?}...",
                    cluster, state, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking cluster {}: {}, retrying in {:?}...",
                    cluster, e, interval
                );
            }
        }

        if Instant::now() + interval > deadline {
            return Err(StackError::ClusterNotReady(format!(
                "cluster {} not active after {:?}",
                cluster, poll.timeout
            )));
        }
        sleep(interval).await;
        interval = (interval * 2).min(poll.max_interval);
    }
}

/// Bring the cluster to `target`, issuing at most one update call and
/// awaiting its final status. Any outcome but success is an error.
#[instrument(skip(api, poll))]
pub async fn ensure_authentication_mode(
    api: &dyn ClusterApi,
    cluster: &str,
    target: AuthenticationMode,
    poll: PollSettings,
) -> Result<AuthModeOutcome> {
    let current = api.authentication_mode(cluster).await?;
    if current == target {
        info!("Cluster {} already uses {}", cluster, target);
        return Ok(AuthModeOutcome::AlreadySet(current));
    }
    if current == AuthenticationMode::Api {
        // EKS never leaves API mode, and access entries already work there
        warn!(
            "Cluster {} uses {}, which cannot be changed to {}",
            cluster, current, target
        );
        return Ok(AuthModeOutcome::AlreadySet(current));
    }

    info!("Switching cluster {} from {} to {}", cluster, current, target);
    let update_id = api
        .update_authentication_mode(cluster, target)
        .await
        .map_err(|e| StackError::AuthModeUpdate(format!("update request failed: {}", e)))?;

    let deadline = Instant::now() + poll.timeout;
    let mut interval = poll.interval;
    loop {
        match api.update_status(cluster, &update_id).await {
            Ok(UpdateStatus::Successful) => {
                info!("Update {} on cluster {} succeeded", update_id, cluster);
                return Ok(AuthModeOutcome::Updated { update_id });
            }
            Ok(UpdateStatus::Failed(reason)) => {
                return Err(StackError::AuthModeUpdate(format!(
                    "update {} failed: {}",
                    update_id, reason
                )));
            }
            Ok(UpdateStatus::Cancelled) => {
                return Err(StackError::AuthModeUpdate(format!(
                    "update {} was cancelled",
                    update_id
                )));
            }
            Ok(UpdateStatus::InProgress) => {
                info!("Update {} in progress, waiting {:?}...", update_id, interval);
            }
            Err(e) => {
                warn!(
                    "Error reading update {}: {}, retrying in {:?}...",
                    update_id, e, interval
                );
            }
        }

        if Instant::now() + interval > deadline {
            return Err(StackError::AuthModeUpdate(format!(
                "update {} not finished after {:?}",
                update_id, poll.timeout
            )));
        }
        sleep(interval).await;
        interval = (interval * 2).min(poll.max_interval);
    }
}
