// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The four stack provisioners and the pipeline entry point that chains them.

pub mod cluster;
pub mod image;
pub mod network;
pub mod workload;

use crate::config::Config;
use crate::error::Result;
use crate::plan::Plan;
use tracing::{info, instrument};

pub use image::IMAGE_ASSET;

/// Validate the configuration and declare every stack, each consuming
/// the handle its predecessor produced.
#[instrument(skip(config), fields(account = %config.account_id, region = %config.region))]
pub fn build_plan(config: &Config) -> Result<Plan> {
    config.validate()?;

    let (mut network_stack, network) = network::provision(config)?;
    let (mut cluster_stack, cluster) = cluster::provision(config, network.clone())?;
    let (mut image_stack, image, asset) = image::provision(config, &cluster)?;
    let mut workload_stack = workload::provision(config, &cluster, &image, &asset)?;

    for stack in [
        &mut network_stack,
        &mut cluster_stack,
        &mut image_stack,
        &mut workload_stack,
    ] {
        stack.add_tag("project", "genai");
    }
    for stack in [&mut network_stack, &mut cluster_stack, &mut image_stack] {
        stack.add_tag("owner", "validation");
    }

    let plan = Plan::new(
        vec![network_stack, cluster_stack, image_stack, workload_stack],
        network,
        cluster,
        image,
    )?;
    info!(
        "Plan ready: {} resources in {} stacks",
        plan.graph().len(),
        plan.stacks().len()
    );
    Ok(plan)
}
