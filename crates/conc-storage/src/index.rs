// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use conc_schema::foundation::digest::Digest;
use conc_schema::foundation::name::PkgName;
use conc_schema::{ConcreteNode, ConcreteSpec, Constraints};

use crate::Result;

#[cfg(test)]
#[path = "./index_test.rs"]
mod index_test;

/// One installed configuration of a package.
///
/// The node is found by `hash` inside `spec`, which also holds
/// everything that the installation depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstalledSpec {
    pub spec: Arc<ConcreteSpec>,
    pub hash: Digest,
}

impl InstalledSpec {
    /// The installed node itself
    pub fn node(&self) -> Option<&Arc<ConcreteNode>> {
        self.spec.get(&self.hash)
    }
}

/// Read access to the configurations that are already installed.
#[async_trait::async_trait]
pub trait InstalledIndex: Send + Sync + std::fmt::Debug {
    /// Find installed configurations of a package that satisfy
    /// the given constraints.
    ///
    /// Results are ordered newest version first, then by hash.
    async fn query(&self, name: &PkgName, constraints: &Constraints)
    -> Result<Vec<InstalledSpec>>;
}

/// An index over installed graphs held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemIndex {
    installed: Vec<Arc<ConcreteSpec>>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an installed graph, making all of its nodes available.
    pub fn add(&mut self, spec: ConcreteSpec) {
        self.installed.push(Arc::new(spec));
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }
}

impl FromIterator<ConcreteSpec> for MemIndex {
    fn from_iter<T: IntoIterator<Item = ConcreteSpec>>(iter: T) -> Self {
        Self {
            installed: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

#[async_trait::async_trait]
impl InstalledIndex for MemIndex {
    async fn query(
        &self,
        name: &PkgName,
        constraints: &Constraints,
    ) -> Result<Vec<InstalledSpec>> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for spec in self.installed.iter() {
            for node in spec.find(name) {
                if !node.satisfies(constraints).is_ok() || !seen.insert(*node.hash()) {
                    continue;
                }
                found.push(InstalledSpec {
                    spec: Arc::clone(spec),
                    hash: *node.hash(),
                });
            }
        }
        found.sort_by(|a, b| {
            let version = |i: &InstalledSpec| i.node().map(|n| n.attrs().version.clone());
            version(b)
                .cmp(&version(a))
                .then_with(|| a.hash.cmp(&b.hash))
        });
        Ok(found)
    }
}
