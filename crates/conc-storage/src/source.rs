// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use conc_schema::PackageDefinition;
use conc_schema::foundation::name::{PkgName, PkgNameBuf};

use crate::Result;

/// Read access to the package universe.
///
/// Every answer must stay the same for as long as a resolution runs,
/// which callers get by resolving against a [`crate::RepositorySnapshot`]
/// rather than a repository that can still be published to.
#[async_trait::async_trait]
pub trait ConstraintSource: Send + Sync + std::fmt::Debug {
    /// Find the definition of a package.
    ///
    /// # Errors
    /// - [`crate::Error::UnknownPackage`] if no definition has this name,
    ///   which includes every virtual name
    async fn lookup(&self, name: &PkgName) -> Result<Arc<PackageDefinition>>;

    /// The packages that declare that they provide the named virtual.
    ///
    /// An empty set is returned for names that nothing provides.
    async fn providers(&self, virtual_name: &PkgName) -> Result<BTreeSet<PkgNameBuf>>;

    /// The names of all defined packages, in order.
    async fn list_packages(&self) -> Result<Vec<PkgNameBuf>>;

    /// True if some package provides this name and none is defined with it.
    async fn is_virtual(&self, name: &PkgName) -> Result<bool> {
        match self.lookup(name).await {
            Ok(_) => Ok(false),
            Err(err) if err.is_unknown_package() => {
                Ok(!self.providers(name).await?.is_empty())
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl<T> ConstraintSource for Arc<T>
where
    T: ConstraintSource + ?Sized,
{
    async fn lookup(&self, name: &PkgName) -> Result<Arc<PackageDefinition>> {
        (**self).lookup(name).await
    }

    async fn providers(&self, virtual_name: &PkgName) -> Result<BTreeSet<PkgNameBuf>> {
        (**self).providers(virtual_name).await
    }

    async fn list_packages(&self) -> Result<Vec<PkgNameBuf>> {
        (**self).list_packages().await
    }
}
