// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid CIDR block: {0}")]
    InvalidCidr(String),

    #[error("Subnet allocation failed: {0}")]
    SubnetAllocation(String),

    #[error("Unknown endpoint service: {0}")]
    UnknownEndpointService(String),

    #[error("Placeholder {placeholder} not found in manifest template {template}")]
    PlaceholderMissing { placeholder: String, template: String },

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid stage chain: {0}")]
    InvalidStageChain(String),

    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Cluster not ready: {0}")]
    ClusterNotReady(String),

    #[error("Authentication mode update failed: {0}")]
    AuthModeUpdate(String),

    #[error("Image build failed: {0}")]
    ImageBuild(String),

    #[error("Chart installation failed: {0}")]
    ChartInstall(String),

    #[error("EKS API error: {0}")]
    Eks(String),

    #[error("Namespace creation failed: {0}")]
    NamespaceError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stage {stage} failed at {resource}: {source}")]
    Stage {
        stage: String,
        resource: String,
        #[source]
        source: Box<StackError>,
    },
}

impl From<serde_yaml::Error> for StackError {
    fn from(e: serde_yaml::Error) -> Self {
        StackError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for StackError {
    fn from(e: serde_json::Error) -> Self {
        StackError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
