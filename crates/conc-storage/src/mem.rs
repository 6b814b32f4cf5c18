// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use conc_schema::PackageDefinition;
use conc_schema::foundation::name::{PkgName, PkgNameBuf};

use crate::{ConstraintSource, Error, RepositorySnapshot, Result};

#[cfg(test)]
#[path = "./mem_test.rs"]
mod mem_test;

/// Policy for publishing definitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PublishPolicy {
    #[default]
    OverwriteExisting,
    DoNotOverwriteExisting,
}

/// A repository of definitions held in memory.
///
/// Publishing replaces the whole set of definitions at once, so a
/// [`RepositorySnapshot`] taken before a publish never observes it.
#[derive(Debug, Default)]
pub struct MemRepository {
    current: ArcSwap<RepositorySnapshot>,
}

impl MemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = PackageDefinition>,
    {
        let snapshot = RepositorySnapshot::new(definitions.into_iter().map(Arc::new))?;
        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
        })
    }

    /// The definitions as they are right now.
    pub fn snapshot(&self) -> Arc<RepositorySnapshot> {
        self.current.load_full()
    }

    /// Add or replace a definition.
    ///
    /// # Errors
    /// - [`Error::PackageExists`] if the package is already present and
    ///   `policy` does not allow it to be replaced
    /// - [`Error::AmbiguousVirtual`] if the definition would make a name
    ///   both a package and a virtual
    pub fn publish(&self, definition: PackageDefinition, policy: PublishPolicy) -> Result<()> {
        let definition = Arc::new(definition);
        self.update(|packages| {
            let name = definition.name().to_owned();
            if policy == PublishPolicy::DoNotOverwriteExisting && packages.contains_key(&name) {
                return Err(Error::PackageExists(name));
            }
            tracing::debug!(pkg = %name, "publishing definition");
            packages.insert(name, Arc::clone(&definition));
            Ok(())
        })
    }

    /// Remove a definition, returning it if it was present.
    pub fn remove(&self, name: &PkgName) -> Result<Option<Arc<PackageDefinition>>> {
        let mut removed = None;
        self.update(|packages| {
            removed = packages.remove(name);
            Ok(())
        })?;
        Ok(removed)
    }

    fn update<F>(&self, mut edit: F) -> Result<()>
    where
        F: FnMut(
            &mut std::collections::BTreeMap<PkgNameBuf, Arc<PackageDefinition>>,
        ) -> Result<()>,
    {
        loop {
            let current = self.current.load_full();
            let mut packages = current.packages().clone();
            edit(&mut packages)?;
            let next = Arc::new(RepositorySnapshot::from_packages(packages)?);
            let previous = self.current.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                return Ok(());
            }
            // another publish landed first, redo the edit on top of it
        }
    }
}

#[async_trait::async_trait]
impl ConstraintSource for MemRepository {
    async fn lookup(&self, name: &PkgName) -> Result<Arc<PackageDefinition>> {
        self.snapshot().lookup(name).await
    }

    async fn providers(&self, virtual_name: &PkgName) -> Result<BTreeSet<PkgNameBuf>> {
        self.snapshot().providers(virtual_name).await
    }

    async fn list_packages(&self) -> Result<Vec<PkgNameBuf>> {
        self.snapshot().list_packages().await
    }
}
