// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::stacks;
use crate::error::{Result, StackError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StageKind {
    Network,
    Cluster,
    Image,
    Workload,
}

impl StageKind {
    /// All stages in the only valid deployment order
    pub const CHAIN: [StageKind; 4] = [
        StageKind::Network,
        StageKind::Cluster,
        StageKind::Image,
        StageKind::Workload,
    ];

    pub fn stack_name(&self) -> &'static str {
        match self {
            StageKind::Network => stacks::NETWORK,
            StageKind::Cluster => stacks::CLUSTER,
            StageKind::Image => stacks::IMAGE,
            StageKind::Workload => stacks::WORKLOAD,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stack_name())
    }
}

/// What a stage hands to its successors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    NetworkHandle,
    ClusterHandle,
    ImageReference,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub description: String,
    /// Stages that must have completed before this one starts
    pub requires: Vec<StageKind>,
    pub produces: ArtifactKind,
}

impl StageDescriptor {
    pub fn network() -> Self {
        Self {
            kind: StageKind::Network,
            description: "Provision custom VPC resources for GenAI Bedrock App".to_string(),
            requires: vec![],
            produces: ArtifactKind::NetworkHandle,
        }
    }

    pub fn cluster() -> Self {
        Self {
            kind: StageKind::Cluster,
            description: "Provision EKS cluster resources for GenAI Bedrock App".to_string(),
            requires: vec![StageKind::Network],
            produces: ArtifactKind::ClusterHandle,
        }
    }

    pub fn image() -> Self {
        Self {
            kind: StageKind::Image,
            description: "Provision ECR resources for GenAI Bedrock App".to_string(),
            requires: vec![StageKind::Cluster],
            produces: ArtifactKind::ImageReference,
        }
    }

    pub fn workload() -> Self {
        Self {
            kind: StageKind::Workload,
            description: "Deploy Streamlit App".to_string(),
            requires: vec![StageKind::Image],
            produces: ArtifactKind::None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.stack_name()
    }
}

/// Check that the stages form the simple chain Network -> Cluster -> Image -> Workload:
/// every stage requires exactly its predecessor, and nothing else.
pub fn validate_chain(stages: &[StageDescriptor]) -> Result<()> {
    if stages.len() != StageKind::CHAIN.len() {
        return Err(StackError::InvalidStageChain(format!(
            "expected {} stages, got {}",
            StageKind::CHAIN.len(),
            stages.len()
        )));
    }

    for (i, (stage, expected)) in stages.iter().zip(StageKind::CHAIN).enumerate() {
        if stage.kind != expected {
            return Err(StackError::InvalidStageChain(format!(
                "position {} holds {}, expected {}",
                i, stage.kind, expected
            )));
        }

        let predecessor: Vec<StageKind> = if i == 0 {
            vec![]
        } else {
            vec![StageKind::CHAIN[i - 1]]
        };
        if stage.requires != predecessor {
            return Err(StackError::InvalidStageChain(format!(
                "{} requires {:?}, expected {:?}",
                stage.kind, stage.requires, predecessor
            )));
        }
    }

    Ok(())
}
