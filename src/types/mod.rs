// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Stage descriptors, resource declarations and the handles passed between stages.

pub mod handles;
pub mod iam;
pub mod resource;
pub mod stage;

pub use handles::{AccessEntry, ClusterHandle, ImageReference, NetworkHandle};
pub use resource::{Resource, ResourceId, ResourceSpec};
pub use stage::{ArtifactKind, StageDescriptor, StageKind};
