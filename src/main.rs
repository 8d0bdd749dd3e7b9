// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use genai_stacks::config::Config;
use genai_stacks::deploy::docker::DockerCli;
use genai_stacks::deploy::eks::{sdk_config, EksClusterApi};
use genai_stacks::deploy::helm::HelmCli;
use genai_stacks::deploy::{DeployOptions, Deployer};
use genai_stacks::kubernetes::{create_client, KubeManifestApplier};
use genai_stacks::plan::synth::write_assembly;
use genai_stacks::stacks::build_plan;

#[derive(Parser)]
#[command(name = "genai-stacks", version, about = "VPC, EKS, ECR and workload stacks for the GenAI Bedrock app")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write every stack template and the assembly manifest
    Synth {
        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,
    },
    /// Print resources in deployment order
    Plan,
    /// Run the steps owned by this tool against the live account and cluster
    Deploy {
        #[arg(long)]
        kubeconfig: Option<PathBuf>,
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        skip_build: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: account={}, region={}, cluster={}",
        config.account_id, config.region, config.cluster_name
    );

    let plan = build_plan(&config)?;

    match cli.command {
        Command::Synth { out } => {
            let written = write_assembly(&plan, &out)?;
            info!("Synthesized {} files into {}", written.len(), out.display());
        }
        Command::Plan => {
            for resource in plan.deployment_order() {
                println!(
                    "{:<22} {:<36} {}",
                    resource.id.stack,
                    resource.id.logical_id,
                    resource.spec.type_name()
                );
            }
        }
        Command::Deploy {
            kubeconfig,
            context,
            skip_build,
        } => {
            let sdk = sdk_config(&config.region).await;
            let client = create_client(kubeconfig.as_deref(), context.as_deref()).await?;
            info!("Connected to Kubernetes cluster");

            let deployer = Deployer::new(
                Arc::new(EksClusterApi::new(&sdk)),
                Arc::new(DockerCli::new()),
                Arc::new(KubeManifestApplier::new(client)),
                Arc::new(HelmCli::new(kubeconfig, context)),
                DeployOptions {
                    skip_build,
                    ..Default::default()
                },
            );

            let report = deployer.deploy(&plan).await?;
            info!(
                "Deployed {} resources, {} left to the reconciliation engine",
                report.applied.len(),
                report.delegated.len()
            );
        }
    }

    Ok(())
}
