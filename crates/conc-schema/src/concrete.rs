// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::edge::EdgeTypes;
use crate::foundation::arch::{Arch, ArchSpec};
use crate::foundation::compiler::{Compiler, CompilerSpec};
use crate::foundation::digest::Digest;
use crate::foundation::name::{PkgName, PkgNameBuf};
use crate::foundation::variant::{VariantMap, VariantRequest, VariantRequests, VariantValue};
use crate::foundation::version::{Compatibility, Version};
use crate::foundation::version_range::VersionList;
use crate::{AbstractSpec, Constraints, Error, Result, hash};

#[cfg(test)]
#[path = "./concrete_test.rs"]
mod concrete_test;

/// Every attribute of a resolved package configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAttrs {
    pub name: PkgNameBuf,
    pub version: Version,
    pub compiler: Compiler,
    pub arch: Arch,
    #[serde(default)]
    pub variants: VariantMap,
}

impl NodeAttrs {
    /// Constraints that pin every attribute of this node exactly
    pub fn to_constraints(&self) -> Constraints {
        let variants: VariantRequests = self
            .variants
            .iter()
            .map(|(name, value)| {
                let request = match value {
                    VariantValue::Bool(b) => VariantRequest::Bool(*b),
                    other => VariantRequest::Values(other.values()),
                };
                (name.clone(), request)
            })
            .collect();
        Constraints {
            versions: VersionList::exact(self.version.clone()),
            compiler: Some(CompilerSpec::new(
                self.compiler.name.clone(),
                VersionList::exact(self.compiler.version.clone()),
            )),
            variants,
            arch: ArchSpec::from(&self.arch),
            hash: None,
        }
    }
}

impl std::fmt::Display for NodeAttrs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.to_constraints())
    }
}

/// A resolved dependency of a concrete node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcreteEdge {
    pub name: PkgNameBuf,
    pub hash: Digest,
    pub types: EdgeTypes,
    /// The virtual packages that this edge satisfies
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub virtuals: BTreeSet<PkgNameBuf>,
}

/// One fully resolved, immutable package configuration.
///
/// The hash is computed once, on construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcreteNode {
    attrs: NodeAttrs,
    dependencies: Vec<ConcreteEdge>,
    hash: Digest,
    external: Option<PathBuf>,
}

impl ConcreteNode {
    pub fn new(attrs: NodeAttrs, mut dependencies: Vec<ConcreteEdge>) -> Result<Self> {
        dependencies.sort_by(|a, b| (&a.types, &a.name).cmp(&(&b.types, &b.name)));
        let hash = hash::node_hash(&attrs, &dependencies)?;
        Ok(Self {
            attrs,
            dependencies,
            hash,
            external: None,
        })
    }

    /// Mark this node as an existing installation outside of conc.
    ///
    /// The location does not contribute to the hash.
    pub fn with_external_prefix<P: Into<PathBuf>>(mut self, prefix: P) -> Self {
        self.external = Some(prefix.into());
        self
    }

    pub fn name(&self) -> &PkgName {
        &self.attrs.name
    }

    pub fn attrs(&self) -> &NodeAttrs {
        &self.attrs
    }

    pub fn hash(&self) -> &Digest {
        &self.hash
    }

    /// Dependency edges, ordered by type and name
    pub fn dependencies(&self) -> &[ConcreteEdge] {
        &self.dependencies
    }

    pub fn external_prefix(&self) -> Option<&Path> {
        self.external.as_deref()
    }

    /// Check this node's own attributes and hash against some constraints
    pub fn satisfies(&self, constraints: &Constraints) -> Compatibility {
        constraints.satisfied_by(&self.attrs, Some(&self.hash))
    }
}

impl std::fmt::Display for ConcreteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} /{}", self.attrs, self.hash.short())
    }
}

/// A resolved, hashed dependency graph with one or more roots.
///
/// Nodes are stored so that every node follows all of its
/// dependencies, and each configuration appears exactly once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConcreteSpec {
    roots: Vec<Digest>,
    nodes: IndexMap<Digest, Arc<ConcreteNode>>,
}

impl ConcreteSpec {
    pub fn builder() -> ConcreteSpecBuilder {
        ConcreteSpecBuilder::default()
    }

    pub fn roots(&self) -> &[Digest] {
        &self.roots
    }

    pub fn root_nodes(&self) -> impl Iterator<Item = &Arc<ConcreteNode>> {
        self.roots.iter().filter_map(|h| self.nodes.get(h))
    }

    /// The first root of this graph.
    pub fn root(&self) -> Option<&Arc<ConcreteNode>> {
        self.root_nodes().next()
    }

    pub fn get(&self, hash: &Digest) -> Option<&Arc<ConcreteNode>> {
        self.nodes.get(hash)
    }

    /// All nodes, dependencies before dependents
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<ConcreteNode>> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node configured for the named package
    pub fn find(&self, name: &PkgName) -> Vec<&Arc<ConcreteNode>> {
        self.nodes.values().filter(|n| n.name() == name).collect()
    }

    /// The node whose hash begins with the given text, if exactly one does
    pub fn find_by_hash_prefix(&self, prefix: &str) -> Option<&Arc<ConcreteNode>> {
        let mut found = self.nodes.values().filter(|n| n.hash().starts_with(prefix));
        match (found.next(), found.next()) {
            (Some(node), None) => Some(node),
            _ => None,
        }
    }

    /// The resolved dependencies of a node, with their edges
    pub fn dependencies_of<'a>(
        &'a self,
        node: &'a ConcreteNode,
    ) -> impl Iterator<Item = (&'a ConcreteEdge, &'a Arc<ConcreteNode>)> + 'a {
        node.dependencies()
            .iter()
            .filter_map(move |edge| self.nodes.get(&edge.hash).map(|dep| (edge, dep)))
    }

    /// Express the graph under one root as an abstract spec that pins
    /// every attribute of every node.
    ///
    /// A package configured more than once under the root is left
    /// unpinned, since a `^name` constraint binds all of its copies.
    /// Its dependents are pinned, and they pull the same copies back in.
    pub fn to_abstract(&self, root: &Digest) -> Option<AbstractSpec> {
        let root = self.nodes.get(root)?;
        let mut reachable: Vec<&ConcreteNode> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&ConcreteNode> = vec![root.as_ref()];
        while let Some(node) = stack.pop() {
            for (_, dep) in self.dependencies_of(node) {
                if seen.insert(*dep.hash()) {
                    stack.push(dep.as_ref());
                    reachable.push(dep.as_ref());
                }
            }
        }

        let mut counts: BTreeMap<&PkgName, usize> = BTreeMap::new();
        for node in reachable.iter() {
            *counts.entry(node.name()).or_default() += 1;
        }
        let mut spec = AbstractSpec::new(root.name().to_owned(), root.attrs().to_constraints());
        for node in reachable {
            if counts.get(node.name()) != Some(&1) {
                continue;
            }
            spec.dependencies
                .push(AbstractSpec::new(node.name().to_owned(), node.attrs().to_constraints()));
        }
        spec.dependencies.sort_by(|a, b| a.name.cmp(&b.name));
        Some(spec)
    }
}

/// Assembles a [`ConcreteSpec`] bottom-up.
#[derive(Default)]
pub struct ConcreteSpecBuilder {
    roots: Vec<Digest>,
    nodes: IndexMap<Digest, Arc<ConcreteNode>>,
}

impl ConcreteSpecBuilder {
    /// Add a node whose dependencies have all been added already.
    ///
    /// A node identical to one already present is shared rather
    /// than duplicated. Returns the stored node.
    ///
    /// The hash leaves out the external prefix, so two nodes with the
    /// same hash that disagree on it cannot share and are rejected.
    pub fn insert(&mut self, node: ConcreteNode) -> Result<Arc<ConcreteNode>> {
        if let Some(existing) = self.nodes.get(node.hash()) {
            if existing.external_prefix() != node.external_prefix() {
                let describe = |prefix: Option<&Path>| match prefix {
                    Some(prefix) => format!("external at {}", prefix.display()),
                    None => "built".to_string(),
                };
                return Err(Error::String(format!(
                    "{} /{} is both {} and {}",
                    node.name(),
                    node.hash().short(),
                    describe(existing.external_prefix()),
                    describe(node.external_prefix())
                )));
            }
            return Ok(Arc::clone(existing));
        }
        for edge in node.dependencies() {
            if !self.nodes.contains_key(&edge.hash) {
                return Err(Error::String(format!(
                    "{} depends on {} /{} which has not been added",
                    node.name(),
                    edge.name,
                    edge.hash.short()
                )));
            }
        }
        let node = Arc::new(node);
        self.nodes.insert(*node.hash(), Arc::clone(&node));
        Ok(node)
    }

    pub fn contains(&self, hash: &Digest) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn get(&self, hash: &Digest) -> Option<&Arc<ConcreteNode>> {
        self.nodes.get(hash)
    }

    /// Mark an added node as a root of the graph
    pub fn add_root(&mut self, hash: Digest) -> Result<()> {
        if !self.nodes.contains_key(&hash) {
            return Err(Error::String(format!(
                "root /{} has not been added",
                hash.short()
            )));
        }
        if !self.roots.contains(&hash) {
            self.roots.push(hash);
        }
        Ok(())
    }

    pub fn build(self) -> ConcreteSpec {
        ConcreteSpec {
            roots: self.roots,
            nodes: self.nodes,
        }
    }
}
