// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Explicit dependency graph over declared resources

use crate::error::{Result, StackError};
use crate::types::ResourceId;
use std::collections::{BTreeSet, HashMap};

/// Directed graph where an edge `a -> b` means `a` depends on `b`.
/// Nodes keep their insertion order, which makes the topological order deterministic.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<ResourceId>,
    index: HashMap<ResourceId, usize>,
    dependencies: Vec<BTreeSet<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn add_node(&mut self, id: ResourceId) -> Result<()> {
        if self.index.contains_key(&id) {
            return Err(StackError::InvalidDependency(format!(
                "resource {} declared twice",
                id
            )));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(id);
        self.dependencies.push(BTreeSet::new());
        Ok(())
    }

    /// Declare that `dependent` must wait for `dependency`
    pub fn add_edge(&mut self, dependent: &ResourceId, dependency: &ResourceId) -> Result<()> {
        let from = self.position(dependent)?;
        let to = self.position(dependency)?;
        if from == to {
            return Err(StackError::DependencyCycle(vec![
                dependent.to_string(),
                dependent.to_string(),
            ]));
        }
        self.dependencies[from].insert(to);
        Ok(())
    }

    fn position(&self, id: &ResourceId) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| StackError::InvalidDependency(format!("unknown resource {}", id)))
    }

    /// Dependencies before dependents; ties broken by insertion order
    pub fn topological_order(&self) -> Result<Vec<ResourceId>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut path = Vec::new();

        for node in 0..self.nodes.len() {
            self.visit(node, &mut marks, &mut path, &mut order)?;
        }

        Ok(order.into_iter().map(|i| self.nodes[i].clone()).collect())
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = path.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&n| self.nodes[n].to_string())
                    .collect();
                cycle.push(self.nodes[node].to_string());
                return Err(StackError::DependencyCycle(cycle));
            }
            Mark::Unvisited => {}
        }

        marks[node] = Mark::InProgress;
        path.push(node);
        for &dep in &self.dependencies[node] {
            self.visit(dep, marks, path, order)?;
        }
        path.pop();
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }

    /// Whether `dependent` transitively depends on `dependency`
    pub fn depends_on(&self, dependent: &ResourceId, dependency: &ResourceId) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(dependent), self.index.get(dependency))
        else {
            return false;
        };

        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            for &dep in &self.dependencies[node] {
                if dep == to {
                    return true;
                }
                if !seen[dep] {
                    seen[dep] = true;
                    stack.push(dep);
                }
            }
        }
        false
    }

    /// Direct dependencies of a node
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.index
            .get(id)
            .map(|&i| self.dependencies[i].iter().map(|&d| &self.nodes[d]).collect())
            .unwrap_or_default()
    }
}
