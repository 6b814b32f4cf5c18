// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use conc_schema::PackageDefinition;
use conc_schema::foundation::name::{PkgName, PkgNameBuf};

use crate::{ConstraintSource, Error, Result, UnknownPackageError};

#[cfg(test)]
#[path = "./snapshot_test.rs"]
mod snapshot_test;

/// An immutable view of a set of package definitions.
///
/// The providers index is derived from the `provides` declarations
/// of the definitions when the snapshot is made.
#[derive(Clone, Debug, Default)]
pub struct RepositorySnapshot {
    packages: BTreeMap<PkgNameBuf, Arc<PackageDefinition>>,
    providers: BTreeMap<PkgNameBuf, BTreeSet<PkgNameBuf>>,
}

impl RepositorySnapshot {
    /// Index a set of definitions.
    ///
    /// Later definitions replace earlier ones with the same name.
    pub fn new<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<PackageDefinition>>,
    {
        let packages = definitions
            .into_iter()
            .map(|def| (def.name().to_owned(), def))
            .collect();
        Self::from_packages(packages)
    }

    pub(crate) fn from_packages(
        packages: BTreeMap<PkgNameBuf, Arc<PackageDefinition>>,
    ) -> Result<Self> {
        let mut providers: BTreeMap<PkgNameBuf, BTreeSet<PkgNameBuf>> = BTreeMap::new();
        for def in packages.values() {
            for name in def.provided_virtuals() {
                if packages.contains_key(name) {
                    return Err(Error::AmbiguousVirtual(
                        name.to_owned(),
                        def.name().to_owned(),
                    ));
                }
                providers
                    .entry(name.to_owned())
                    .or_default()
                    .insert(def.name().to_owned());
            }
        }
        Ok(Self {
            packages,
            providers,
        })
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, name: &PkgName) -> Option<&Arc<PackageDefinition>> {
        self.packages.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<PackageDefinition>> {
        self.packages.values()
    }

    /// Every virtual name that at least one package provides
    pub fn virtuals(&self) -> impl Iterator<Item = &PkgName> {
        self.providers.keys().map(std::ops::Deref::deref)
    }

    pub(crate) fn packages(&self) -> &BTreeMap<PkgNameBuf, Arc<PackageDefinition>> {
        &self.packages
    }
}

#[async_trait::async_trait]
impl ConstraintSource for RepositorySnapshot {
    async fn lookup(&self, name: &PkgName) -> Result<Arc<PackageDefinition>> {
        self.packages
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| {
                UnknownPackageError {
                    name: name.to_owned(),
                }
                .into()
            })
    }

    async fn providers(&self, virtual_name: &PkgName) -> Result<BTreeSet<PkgNameBuf>> {
        Ok(self
            .providers
            .get(virtual_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_packages(&self) -> Result<Vec<PkgNameBuf>> {
        Ok(self.packages.keys().cloned().collect())
    }
}
