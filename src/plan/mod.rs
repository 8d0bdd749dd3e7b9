// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Stacks of declared resources and the validated plan that chains them.

pub mod graph;
pub mod synth;

pub use graph::DependencyGraph;

use crate::error::{Result, StackError};
use crate::types::stage::validate_chain;
use crate::types::{
    ClusterHandle, ImageReference, NetworkHandle, Resource, ResourceId, ResourceSpec,
    StageDescriptor, StageKind,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One stage's worth of resource declarations
#[derive(Debug, Clone)]
pub struct Stack {
    descriptor: StageDescriptor,
    tags: BTreeMap<String, String>,
    resources: Vec<Resource>,
}

impl Stack {
    pub fn new(descriptor: StageDescriptor) -> Self {
        Self {
            descriptor,
            tags: BTreeMap::new(),
            resources: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name()
    }

    pub fn kind(&self) -> StageKind {
        self.descriptor.kind
    }

    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    /// Tag applied to every resource of the stack
    pub fn add_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    /// Declare a resource and return its id
    pub fn add(&mut self, logical_id: &str, spec: ResourceSpec) -> Result<ResourceId> {
        let id = ResourceId::new(self.name(), logical_id);
        if self.resource(&id).is_some() {
            return Err(StackError::InvalidDependency(format!(
                "resource {} declared twice",
                id
            )));
        }
        self.resources.push(Resource::new(id.clone(), spec));
        Ok(id)
    }

    /// Declare that `dependent`, a resource of this stack, waits for `dependency`.
    /// The dependency may live in this stack or an earlier one.
    pub fn add_dependency(&mut self, dependent: &ResourceId, dependency: &ResourceId) -> Result<()> {
        let resource = self.resource_mut(dependent)?;
        resource.depends_on.insert(dependency.clone());
        Ok(())
    }

    pub fn tag_resource(&mut self, id: &ResourceId, key: &str, value: &str) -> Result<()> {
        let resource = self.resource_mut(id)?;
        resource.tags.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn resource_mut(&mut self, id: &ResourceId) -> Result<&mut Resource> {
        let stack = self.name();
        self.resources
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| {
                StackError::InvalidDependency(format!("{} is not declared in {}", id, stack))
            })
    }
}

/// The four stacks, their explicit dependency graph, and the handles passed between them
#[derive(Debug)]
pub struct Plan {
    stacks: Vec<Stack>,
    graph: DependencyGraph,
    order: Vec<ResourceId>,
    network: Arc<NetworkHandle>,
    cluster: Arc<ClusterHandle>,
    image: ImageReference,
}

impl Plan {
    pub fn new(
        stacks: Vec<Stack>,
        network: Arc<NetworkHandle>,
        cluster: Arc<ClusterHandle>,
        image: ImageReference,
    ) -> Result<Self> {
        let descriptors: Vec<StageDescriptor> =
            stacks.iter().map(|s| s.descriptor().clone()).collect();
        validate_chain(&descriptors)?;

        let mut graph = DependencyGraph::new();
        for resource in stacks.iter().flat_map(|s| s.resources()) {
            graph.add_node(resource.id.clone())?;
        }

        let stack_position = |name: &str| stacks.iter().position(|s| s.name() == name);
        for (position, stack) in stacks.iter().enumerate() {
            for resource in stack.resources() {
                for dependency in &resource.depends_on {
                    // stacks only wait for their predecessors, never the other way round
                    match stack_position(&dependency.stack) {
                        Some(p) if p <= position => {}
                        Some(_) => {
                            return Err(StackError::InvalidDependency(format!(
                                "{} depends on {} from a later stack",
                                resource.id, dependency
                            )))
                        }
                        None => {
                            return Err(StackError::InvalidDependency(format!(
                                "{} depends on {} from an unknown stack",
                                resource.id, dependency
                            )))
                        }
                    }
                    graph.add_edge(&resource.id, dependency)?;
                }
            }
        }

        let global = graph.topological_order()?;
        // cross-stack edges point backwards, so grouping by stack keeps every edge satisfied
        let mut order = Vec::with_capacity(global.len());
        for stack in &stacks {
            order.extend(global.iter().filter(|id| id.stack == stack.name()).cloned());
        }
        debug!("Plan validated with {} resources", order.len());

        Ok(Self {
            stacks,
            graph,
            order,
            network,
            cluster,
            image,
        })
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn stack(&self, kind: StageKind) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.kind() == kind)
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.stacks.iter().find_map(|s| s.resource(id))
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn network(&self) -> &NetworkHandle {
        &self.network
    }

    pub fn cluster(&self) -> &ClusterHandle {
        &self.cluster
    }

    pub fn image(&self) -> &ImageReference {
        &self.image
    }

    /// Every resource, stack by stack, each after everything it depends on
    pub fn deployment_order(&self) -> Vec<&Resource> {
        self.order
            .iter()
            .filter_map(|id| self.resource(id))
            .collect()
    }

    /// The stage a resource belongs to
    pub fn stage_of(&self, id: &ResourceId) -> Option<StageKind> {
        self.stacks
            .iter()
            .find(|s| s.name() == id.stack)
            .map(|s| s.kind())
    }

    /// Whether the declared edges guarantee that `first` completes before `second` starts,
    /// either through a resource-level dependency or because `first` lives in an earlier stack.
    pub fn happens_before(&self, first: &ResourceId, second: &ResourceId) -> bool {
        if self.graph.depends_on(second, first) {
            return true;
        }
        match (self.stage_of(first), self.stage_of(second)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// Resources of the given type, in deployment order
    pub fn resources_of_type(&self, type_name: &str) -> Vec<&Resource> {
        self.deployment_order()
            .into_iter()
            .filter(|r| r.spec.type_name() == type_name)
            .collect()
    }
}
