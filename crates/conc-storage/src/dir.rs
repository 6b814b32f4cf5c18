// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use conc_schema::foundation::name::{PkgName, PkgNameBuf};
use conc_schema::{FromYaml, PackageDefinition};

use crate::{ConstraintSource, Error, InvalidPackageDefinition, RepositorySnapshot, Result};

#[cfg(test)]
#[path = "./dir_test.rs"]
mod dir_test;

/// The file extension of package definitions on disk
pub const DEFINITION_EXTENSION: &str = "yaml";

/// A directory of package definition files, one package per file.
///
/// All definitions are read once, when the repository is opened,
/// and never reread.
#[derive(Clone, Debug)]
pub struct DirRepository {
    root: PathBuf,
    snapshot: Arc<RepositorySnapshot>,
}

impl DirRepository {
    /// Load every `*.yaml` definition directly under `root`.
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::DirectoryNotFound(root));
        }
        let pattern = format!(
            "{}/*.{DEFINITION_EXTENSION}",
            glob::Pattern::escape(&root.to_string_lossy())
        );

        let mut packages: BTreeMap<PkgNameBuf, Arc<PackageDefinition>> = BTreeMap::new();
        let mut sources: BTreeMap<PkgNameBuf, PathBuf> = BTreeMap::new();
        let mut glob_results = glob::glob(&pattern)?;
        while let Some(path) = glob_results.next().transpose()? {
            let definition = read_definition(&path)?;
            let name = definition.name().to_owned();
            if path.file_stem().and_then(|s| s.to_str()) != Some(name.as_str()) {
                tracing::warn!(
                    "{} defines {name}, which does not match its file name",
                    path.display()
                );
            }
            if let Some(previous) = sources.insert(name.clone(), path.clone()) {
                return Err(Error::String(format!(
                    "{name} is defined in both {} and {}",
                    previous.display(),
                    path.display()
                )));
            }
            packages.insert(name, Arc::new(definition));
        }
        tracing::debug!(
            "loaded {} definitions from {}",
            packages.len(),
            root.display()
        );

        Ok(Self {
            snapshot: Arc::new(RepositorySnapshot::from_packages(packages)?),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot(&self) -> Arc<RepositorySnapshot> {
        Arc::clone(&self.snapshot)
    }
}

fn read_definition(path: &Path) -> Result<PackageDefinition> {
    let yaml = std::fs::read_to_string(path)
        .map_err(|err| Error::FileReadError(path.to_owned(), err))?;
    PackageDefinition::from_yaml(yaml).map_err(|err| {
        Error::InvalidPackageDefinition(Box::new(InvalidPackageDefinition(
            path.to_owned(),
            err.to_string(),
        )))
    })
}

#[async_trait::async_trait]
impl ConstraintSource for DirRepository {
    async fn lookup(&self, name: &PkgName) -> Result<Arc<PackageDefinition>> {
        self.snapshot.lookup(name).await
    }

    async fn providers(&self, virtual_name: &PkgName) -> Result<BTreeSet<PkgNameBuf>> {
        self.snapshot.providers(virtual_name).await
    }

    async fn list_packages(&self) -> Result<Vec<PkgNameBuf>> {
        self.snapshot.list_packages().await
    }
}
