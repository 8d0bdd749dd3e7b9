// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart installs through the helm CLI

use crate::deploy::backend::ChartInstaller;
use crate::error::{Result, StackError};
use crate::types::resource::HelmChart;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

pub struct HelmCli {
    program: String,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
}

impl HelmCli {
    pub fn new(kubeconfig: Option<PathBuf>, context: Option<String>) -> Self {
        Self {
            program: "helm".to_string(),
            kubeconfig,
            context,
        }
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// `helm upgrade --install`, values read from stdin
    pub fn args(&self, chart: &HelmChart) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            chart.release.clone(),
            chart.chart_ref(),
            "--namespace".to_string(),
            chart.namespace.clone(),
            "--values".to_string(),
            "-".to_string(),
        ];
        if !chart.is_oci() {
            args.push("--repo".to_string());
            args.push(chart.repository.clone());
        }
        if let Some(version) = &chart.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        if chart.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        if let Some(context) = &self.context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
        args
    }
}

#[async_trait]
impl ChartInstaller for HelmCli {
    #[instrument(skip(self, chart), fields(release = %chart.release, namespace = %chart.namespace))]
    async fn install(&self, chart: &HelmChart) -> Result<()> {
        let args = self.args(chart);
        let values = serde_yaml::to_string(&chart.values)?;
        debug!("Running {} {}", self.program, args.join(" "));

        let install_error =
            |e: std::io::Error| StackError::ChartInstall(format!("{}: {}", chart.release, e));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(install_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(values.as_bytes()).await {
                Ok(()) => {}
                // helm exited before reading its values; the exit status says why
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!("{} closed stdin early", self.program)
                }
                Err(e) => return Err(install_error(e)),
            }
        }

        let output = child.wait_with_output().await.map_err(install_error)?;
        if !output.status.success() {
            return Err(StackError::ChartInstall(format!(
                "{} exited with {}: {}",
                chart.release,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!("Installed {} into {}", chart.release, chart.namespace);
        Ok(())
    }
}
