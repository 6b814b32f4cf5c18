// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use conc_schema::foundation::digest::Digest;
use conc_schema::foundation::format::FormatSolution;
use conc_schema::foundation::name::{PkgName, PkgNameBuf};
use conc_schema::{
    ConcreteEdge,
    ConcreteNode,
    ConcreteSpec,
    ConcreteSpecBuilder,
    ConflictError,
    EdgeTypes,
    HashMismatchError,
    NodeAttrs,
    NodeKey,
    PackageDefinition,
    format_edge_types,
};
use itertools::Itertools;

use crate::{CycleDetectedError, Error, Result, UnificationError};

#[cfg(test)]
#[path = "./solution_test.rs"]
mod solution_test;

/// Where the configuration of a resolved node comes from.
#[derive(Clone, Debug)]
pub enum PackageSource {
    /// The node is a new configuration that is yet to be built
    Build,
    /// The node is an installation that conc did not make
    External {
        /// Where the installation lives
        prefix: PathBuf,
    },
    /// The node reuses an installed configuration.
    Installed {
        /// The installed graph, which holds the node and
        /// everything it depends on
        spec: Arc<ConcreteSpec>,
        hash: Digest,
    },
}

impl PackageSource {
    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build)
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External { .. })
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }

    /// The hash recorded for a reused installation
    pub fn installed_hash(&self) -> Option<&Digest> {
        match self {
            Self::Installed { hash, .. } => Some(hash),
            _ => None,
        }
    }
}

impl PartialEq for PackageSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Build, Self::Build) => true,
            (Self::External { prefix: a }, Self::External { prefix: b }) => a == b,
            (Self::Installed { hash: a, .. }, Self::Installed { hash: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for PackageSource {}

impl std::hash::Hash for PackageSource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Build => {}
            Self::External { prefix } => prefix.hash(state),
            // the installed graph is identified by the node's hash
            Self::Installed { hash, .. } => hash.hash(state),
        }
    }
}

impl std::fmt::Display for PackageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => f.write_str("build"),
            Self::External { prefix } => write!(f, "external {}", prefix.display()),
            Self::Installed { hash, .. } => write!(f, "installed /{}", hash.short()),
        }
    }
}

/// A dependency of a resolved node, before hashes are known.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SolvedEdge {
    /// The node depended on, or the virtual package when
    /// `target.name` is one of `virtuals`
    pub target: NodeKey,
    pub types: EdgeTypes,
    /// The virtual packages that this edge satisfies
    pub virtuals: BTreeSet<PkgNameBuf>,
}

impl SolvedEdge {
    pub fn new(target: NodeKey, types: EdgeTypes) -> Self {
        Self {
            target,
            types,
            virtuals: BTreeSet::new(),
        }
    }

    /// A dependency on whichever package provides the virtual
    pub fn virtual_dependency(virtual_name: PkgNameBuf, types: EdgeTypes) -> Self {
        Self {
            target: NodeKey::new(virtual_name.clone()),
            types,
            virtuals: BTreeSet::from([virtual_name]),
        }
    }

    /// True if the target still needs to be looked up through the
    /// chosen provider of a virtual package
    pub fn is_virtual(&self) -> bool {
        self.virtuals.contains(&self.target.name)
    }
}

/// A resolved node that has not been hashed yet.
#[derive(Clone, Debug)]
pub struct SolvedNode {
    pub key: NodeKey,
    pub attrs: NodeAttrs,
    pub dependencies: Vec<SolvedEdge>,
    pub source: PackageSource,
    /// The definition the node was configured from
    pub definition: Arc<PackageDefinition>,
}

impl SolvedNode {
    pub fn name(&self) -> &PkgName {
        &self.attrs.name
    }
}

impl PartialEq for SolvedNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.attrs == other.attrs
            && self.dependencies == other.dependencies
            && self.source == other.source
    }
}

impl Eq for SolvedNode {}

impl std::hash::Hash for SolvedNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // the definition is implied by the name
        self.key.hash(state);
        self.attrs.hash(state);
        self.dependencies.hash(state);
        self.source.hash(state);
    }
}

impl std::fmt::Display for SolvedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.key, self.attrs.to_constraints())
    }
}

/// Represents a set of resolved nodes.
#[derive(Clone, Debug, Default)]
pub struct Solution {
    roots: Vec<NodeKey>,
    nodes: BTreeMap<NodeKey, Arc<SolvedNode>>,
    providers: BTreeMap<PkgNameBuf, PkgNameBuf>,
    exempt: BTreeSet<PkgNameBuf>,
}

impl Solution {
    pub fn new(roots: Vec<NodeKey>) -> Self {
        Self {
            roots,
            ..Default::default()
        }
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    /// Add a resolved node, replacing any with the same key
    pub fn add(&mut self, node: Arc<SolvedNode>) {
        self.nodes.insert(node.key.clone(), node);
    }

    /// Record the package chosen to satisfy a virtual
    pub fn set_provider(&mut self, virtual_name: PkgNameBuf, provider: PkgNameBuf) {
        self.providers.insert(virtual_name, provider);
    }

    pub fn provider(&self, virtual_name: &PkgName) -> Option<&PkgName> {
        self.providers.get(virtual_name).map(std::ops::Deref::deref)
    }

    /// Allow the named package to appear with several configurations
    pub fn add_exempt(&mut self, name: PkgNameBuf) {
        self.exempt.insert(name);
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Arc<SolvedNode>> {
        self.nodes.get(key)
    }

    /// Every resolved node of the named package
    pub fn find(&self, name: &PkgName) -> Vec<&Arc<SolvedNode>> {
        self.nodes.values().filter(|n| n.name() == name).collect()
    }

    /// All resolved nodes, ordered by key
    pub fn items(&self) -> impl Iterator<Item = &Arc<SolvedNode>> {
        self.nodes.values()
    }

    /// The number of nodes in this solution
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node that an edge leads to, following virtuals
    /// through their chosen providers
    pub fn edge_target(&self, edge: &SolvedEdge) -> Result<NodeKey> {
        if !edge.is_virtual() {
            return Ok(edge.target.clone());
        }
        self.providers
            .get(&edge.target.name)
            .map(|provider| NodeKey::new(provider.clone()))
            .ok_or_else(|| Error::UnresolvedVirtual(edge.target.name.clone()))
    }

    /// Hash every node bottom-up and check the resulting graph.
    ///
    /// # Errors
    /// - [`Error::Cycle`] if some node depends on itself
    /// - [`Error::Unification`] if a package that is not exempt
    ///   resolved to more than one configuration
    /// - [`Error::Conflict`] if a declared conflict holds in the graph
    /// - a hash mismatch if a reused installation no longer hashes
    ///   to its recorded value
    pub fn assemble(&self) -> Result<ConcreteSpec> {
        let mut assembly = Assembly::default();
        for root in self.roots.iter() {
            let node = self.assemble_node(root, &mut assembly)?;
            assembly.builder.add_root(*node.hash())?;
        }
        let spec = assembly.builder.build();
        self.check_unification(&spec)?;
        check_conflicts(&spec, &assembly.definitions)?;
        tracing::debug!(nodes = spec.len(), roots = spec.roots().len(), "assembled graph");
        Ok(spec)
    }

    fn assemble_node(&self, key: &NodeKey, assembly: &mut Assembly) -> Result<Arc<ConcreteNode>> {
        if let Some(node) = assembly.built.get(key) {
            return Ok(Arc::clone(node));
        }
        if let Some(start) = assembly.path.iter().position(|k| k == key) {
            let mut cycle: Vec<String> = assembly.path[start..]
                .iter()
                .map(ToString::to_string)
                .collect();
            cycle.push(key.to_string());
            return Err(CycleDetectedError { cycle }.into());
        }
        let solved = self
            .nodes
            .get(key)
            .ok_or_else(|| Error::MissingNode(key.clone()))?;

        assembly.path.push(key.clone());
        let mut edges: Vec<ConcreteEdge> = Vec::with_capacity(solved.dependencies.len());
        for edge in solved.dependencies.iter() {
            let target = self.edge_target(edge)?;
            let dep = self.assemble_node(&target, assembly)?;
            match edges.iter_mut().find(|e| e.hash == *dep.hash()) {
                Some(existing) => {
                    existing.types.extend(edge.types.iter().copied());
                    existing.virtuals.extend(edge.virtuals.iter().cloned());
                }
                None => edges.push(ConcreteEdge {
                    name: dep.name().to_owned(),
                    hash: *dep.hash(),
                    types: edge.types.clone(),
                    virtuals: edge.virtuals.clone(),
                }),
            }
        }
        assembly.path.pop();

        let mut node = ConcreteNode::new(solved.attrs.clone(), edges)?;
        match &solved.source {
            PackageSource::Build => {}
            PackageSource::External { prefix } => {
                node = node.with_external_prefix(prefix.clone());
            }
            PackageSource::Installed { hash, .. } => {
                if hash != node.hash() {
                    return Err(conc_schema::Error::from(HashMismatchError {
                        name: node.name().to_owned(),
                        recorded: *hash,
                        computed: *node.hash(),
                    })
                    .into());
                }
            }
        }
        let node = assembly.builder.insert(node)?;
        assembly
            .definitions
            .insert(*node.hash(), Arc::clone(&solved.definition));
        assembly.built.insert(key.clone(), Arc::clone(&node));
        Ok(node)
    }

    fn check_unification(&self, spec: &ConcreteSpec) -> Result<()> {
        let by_name = spec.nodes().into_group_map_by(|node| node.name().to_owned());
        for (name, nodes) in by_name.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
            if nodes.len() < 2 || self.exempt.contains(&name) {
                continue;
            }
            return Err(UnificationError {
                name,
                nodes: nodes.iter().map(ToString::to_string).collect(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Default)]
struct Assembly {
    builder: ConcreteSpecBuilder,
    built: BTreeMap<NodeKey, Arc<ConcreteNode>>,
    definitions: BTreeMap<Digest, Arc<PackageDefinition>>,
    path: Vec<NodeKey>,
}

fn check_conflicts(
    spec: &ConcreteSpec,
    definitions: &BTreeMap<Digest, Arc<PackageDefinition>>,
) -> Result<()> {
    for node in spec.nodes() {
        let Some(definition) = definitions.get(node.hash()) else {
            continue;
        };
        for conflict in definition.conflicts() {
            if conflict.is_triggered(node.attrs(), Some(node.hash()), spec) {
                return Err(ConflictError::new(node.attrs(), &conflict.spec)
                    .with_reason(conflict.describe(node.name()))
                    .into());
            }
        }
    }
    Ok(())
}

impl FormatSolution for Solution {
    fn format_solution(&self, verbosity: u32) -> String {
        if self.is_empty() {
            return "Nothing Resolved".to_string();
        }

        let mut out = "Resolved Packages:\n".to_string();
        for node in self.items() {
            // pinned constraints always begin with the version
            let _ = write!(
                out,
                "  {}{}",
                node.key.to_string().bold(),
                node.attrs.to_constraints()
            );
            match &node.source {
                PackageSource::Build => {}
                source => {
                    let _ = write!(out, " [{}]", source.to_string().cyan());
                }
            }
            if verbosity > 0 && !node.dependencies.is_empty() {
                let deps = node
                    .dependencies
                    .iter()
                    .map(|edge| format!("{} ({})", edge.target, format_edge_types(&edge.types)))
                    .join(", ");
                let _ = write!(out, " (depends on {deps})");
            }
            out.push('\n');
        }
        if verbosity > 0 {
            for (virtual_name, provider) in self.providers.iter() {
                let _ = writeln!(out, "  {virtual_name} provided by {provider}");
            }
        }
        let _ = write!(out, " Number of Packages: {}", self.len());
        out
    }
}
