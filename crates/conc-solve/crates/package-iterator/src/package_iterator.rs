// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use conc_config::{Config, External};
use conc_schema::foundation::arch::Arch;
use conc_schema::foundation::compiler::Compiler;
use conc_schema::foundation::name::PkgNameBuf;
use conc_schema::foundation::version::parse_version;
use conc_schema::{Constraints, NodeAttrs, PackageDefinition};
use conc_solve_solution::PackageSource;
use conc_storage::{InstalledIndex, InstalledSpec};
use dyn_clone::DynClone;

use crate::Result;

#[cfg(test)]
#[path = "./package_iterator_test.rs"]
mod package_iterator_test;

/// One option for resolving the next request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Candidate {
    /// A full configuration of the requested package
    Package {
        attrs: NodeAttrs,
        source: PackageSource,
    },
    /// A package to satisfy the requested virtual
    Provider(PkgNameBuf),
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Candidate::Package {
                attrs,
                source: PackageSource::Build,
            } => attrs.fmt(f),
            Candidate::Package { attrs, source } => write!(f, "{attrs} [{source}]"),
            Candidate::Provider(name) => write!(f, "provider {name}"),
        }
    }
}

/// A stateful cursor over candidates, cloned when the solver
/// needs to resume from an earlier decision.
#[async_trait::async_trait]
pub trait CandidateIterator: DynClone + Send + Sync + std::fmt::Debug {
    async fn next(&mut self) -> Result<Option<Candidate>>;

    /// Why some sources of candidates offered nothing, for reporting
    /// when no candidate is acceptable
    fn notes(&self) -> Vec<String> {
        Vec::new()
    }
}

dyn_clone::clone_trait_object!(CandidateIterator);

/// Installed configurations that satisfy a request, newest first.
///
/// The index is only queried once the first candidate is needed.
#[derive(Clone, Debug)]
pub struct ReuseIterator {
    index: Arc<dyn InstalledIndex>,
    request: PkgNameBuf,
    constraints: Constraints,
    found: Option<VecDeque<InstalledSpec>>,
}

impl ReuseIterator {
    pub fn new(index: Arc<dyn InstalledIndex>, name: PkgNameBuf, constraints: Constraints) -> Self {
        Self {
            index,
            request: name,
            constraints,
            found: None,
        }
    }
}

#[async_trait::async_trait]
impl CandidateIterator for ReuseIterator {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        if self.found.is_none() {
            let found = self.index.query(&self.request, &self.constraints).await?;
            tracing::trace!(name = %self.request, count = found.len(), "installed candidates");
            self.found = Some(found.into());
        }
        let Some(found) = self.found.as_mut() else {
            return Ok(None);
        };
        while let Some(installed) = found.pop_front() {
            let Some(node) = installed.node() else {
                tracing::warn!(
                    "installed spec has no node /{}, skipping",
                    installed.hash.short()
                );
                continue;
            };
            return Ok(Some(Candidate::Package {
                attrs: node.attrs().clone(),
                source: PackageSource::Installed {
                    hash: installed.hash,
                    spec: Arc::clone(&installed.spec),
                },
            }));
        }
        Ok(None)
    }
}

/// The externals configured for a package, in configuration order.
#[derive(Clone, Debug, Default)]
pub struct ExternalIterator {
    candidates: VecDeque<Candidate>,
    notes: Vec<String>,
}

impl ExternalIterator {
    pub fn new(definition: &PackageDefinition, config: &Config) -> Self {
        let mut iter = Self::default();
        for external in config.externals(definition.name()) {
            match external_attrs(definition, external, config) {
                Ok(attrs) => iter.candidates.push_back(Candidate::Package {
                    attrs,
                    source: PackageSource::External {
                        prefix: external.prefix.clone(),
                    },
                }),
                Err(reason) => {
                    tracing::warn!("Skipping external {}: {reason}", external.spec);
                    iter.notes.push(format!("external {}: {reason}", external.spec));
                }
            }
        }
        iter
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[async_trait::async_trait]
impl CandidateIterator for ExternalIterator {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        Ok(self.candidates.pop_front())
    }

    fn notes(&self) -> Vec<String> {
        self.notes.clone()
    }
}

/// Complete the attributes of an external installation.
///
/// Whatever the external spec leaves open is filled from the
/// definition's defaults and the configured compilers and targets.
pub fn external_attrs(
    definition: &PackageDefinition,
    external: &External,
    config: &Config,
) -> std::result::Result<NodeAttrs, String> {
    let spec = &external.spec;
    if let Some(name) = &spec.name {
        if name != definition.name() {
            return Err(format!("not a configuration of {}", definition.name()));
        }
    }
    let constraints = &spec.constraints;

    let version = match constraints.versions.as_exact() {
        Some(version) => version.clone(),
        None => match parse_version(constraints.versions.to_string()) {
            Ok(version) => version,
            Err(_) => definition
                .versions()
                .iter()
                .map(|decl| &decl.version)
                .find(|v| constraints.versions.contains(v).is_ok())
                .cloned()
                .ok_or_else(|| "no single version is named".to_string())?,
        },
    };

    let compiler = match &constraints.compiler {
        Some(wanted) => {
            let exact = wanted
                .versions
                .as_exact()
                .cloned()
                .or_else(|| parse_version(wanted.versions.to_string()).ok());
            match exact {
                Some(version) => Compiler::new(wanted.name.clone(), version),
                None => config
                    .compilers
                    .iter()
                    .find(|c| wanted.satisfied_by(c).is_ok())
                    .cloned()
                    .ok_or_else(|| format!("no configured compiler satisfies %{wanted}"))?,
            }
        }
        None => config
            .compilers
            .first()
            .cloned()
            .ok_or_else(|| "no compiler is named and none is configured".to_string())?,
    };

    let default = config.default_target();
    let part = |given: &Option<String>, fallback: Option<&String>| {
        given.clone().or_else(|| fallback.cloned())
    };
    let arch = match (
        part(&constraints.arch.platform, default.map(|a| &a.platform)),
        part(&constraints.arch.os, default.map(|a| &a.os)),
        part(&constraints.arch.target, default.map(|a| &a.target)),
    ) {
        (Some(platform), Some(os), Some(target)) => Arch::new(platform, os, target),
        _ => return Err("no architecture is named and no target is configured".to_string()),
    };

    let mut variants = definition.default_variants();
    for (name, request) in constraints.variants.iter() {
        let decl = definition
            .variant(name)
            .ok_or_else(|| format!("{} has no variant named '{name}'", definition.name()))?;
        variants.insert(name.clone(), decl.value_for(request)?);
    }

    Ok(NodeAttrs {
        name: definition.name().to_owned(),
        version,
        compiler,
        arch,
        variants,
    })
}

/// The packages that could satisfy a virtual, in the order to try them.
#[derive(Clone, Debug)]
pub struct ProviderIterator {
    virtual_name: PkgNameBuf,
    providers: VecDeque<PkgNameBuf>,
}

impl ProviderIterator {
    /// Order providers: those already in the resolution first, then
    /// those the configuration prefers, then the rest by name.
    pub fn new(
        virtual_name: PkgNameBuf,
        candidates: BTreeSet<PkgNameBuf>,
        resolved: &BTreeSet<PkgNameBuf>,
        preferred: &[PkgNameBuf],
    ) -> Self {
        let mut providers: VecDeque<PkgNameBuf> = candidates
            .iter()
            .filter(|name| resolved.contains(*name))
            .cloned()
            .collect();
        for name in preferred.iter().chain(candidates.iter()) {
            if candidates.contains(name) && !providers.contains(name) {
                providers.push_back(name.clone());
            }
        }
        Self {
            virtual_name,
            providers,
        }
    }

    pub fn virtual_name(&self) -> &PkgNameBuf {
        &self.virtual_name
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait::async_trait]
impl CandidateIterator for ProviderIterator {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        Ok(self.providers.pop_front().map(Candidate::Provider))
    }
}

/// Every candidate for one node: reusable installations, then
/// externals, then new builds.
#[derive(Clone, Debug, Default)]
pub struct NodeCandidates {
    sources: VecDeque<Box<dyn CandidateIterator>>,
    notes: Vec<String>,
}

impl NodeCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source, tried after every source added before it
    pub fn push<I>(&mut self, source: I)
    where
        I: CandidateIterator + 'static,
    {
        self.sources.push_back(Box::new(source));
    }

    /// Record why some kind of candidate is not offered
    pub fn add_note<S: Into<String>>(&mut self, note: S) {
        self.notes.push(note.into());
    }
}

#[async_trait::async_trait]
impl CandidateIterator for NodeCandidates {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        while let Some(source) = self.sources.front_mut() {
            if let Some(candidate) = source.next().await? {
                return Ok(Some(candidate));
            }
            if let Some(source) = self.sources.pop_front() {
                self.notes.extend(source.notes());
            }
        }
        Ok(None)
    }

    fn notes(&self) -> Vec<String> {
        let mut notes = self.notes.clone();
        for source in self.sources.iter() {
            notes.extend(source.notes());
        }
        notes
    }
}
