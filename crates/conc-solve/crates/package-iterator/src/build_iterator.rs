// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_config::Config;
use conc_schema::foundation::arch::Arch;
use conc_schema::foundation::compiler::Compiler;
use conc_schema::foundation::name::{PkgNameBuf, VariantNameBuf};
use conc_schema::foundation::variant::{VariantMap, VariantValue};
use conc_schema::foundation::version::Version;
use conc_schema::{NodeAttrs, PackageDefinition, PkgRequest, VersionDecl};
use conc_solve_solution::PackageSource;
use itertools::Itertools;

use crate::{Candidate, CandidateIterator, Result};

#[cfg(test)]
#[path = "./build_iterator_test.rs"]
mod build_iterator_test;

/// Every new configuration of a package worth trying, most
/// preferred first.
///
/// Each attribute has its own ordered list of values. Candidates
/// are produced like the digits of an odometer: the target changes
/// fastest, then the compiler, then variants in name order, and
/// the version changes slowest.
#[derive(Clone, Debug)]
pub struct BuildIterator {
    name: PkgNameBuf,
    versions: Vec<Version>,
    variants: Vec<(VariantNameBuf, Vec<VariantValue>)>,
    compilers: Vec<Compiler>,
    targets: Vec<Arch>,
    cursor: Vec<usize>,
    exhausted: bool,
    notes: Vec<String>,
}

impl BuildIterator {
    /// Plan the builds of a package that satisfy a request.
    ///
    /// `inherited` is the node that made the request, if it is already
    /// resolved, whose compiler and target are tried first.
    pub fn new(
        definition: &PackageDefinition,
        request: &PkgRequest,
        config: &Config,
        inherited: Option<&NodeAttrs>,
    ) -> Self {
        let mut iter = Self {
            name: definition.name().to_owned(),
            versions: Vec::new(),
            variants: Vec::new(),
            compilers: Vec::new(),
            targets: Vec::new(),
            cursor: Vec::new(),
            exhausted: false,
            notes: Vec::new(),
        };

        iter.versions = order_versions(definition, request, config);
        if iter.versions.is_empty() {
            iter.notes.push(format!(
                "no declared version of {} satisfies @{}",
                iter.name, request.constraints.versions
            ));
        }
        match order_variants(definition, request, config) {
            Ok(variants) => iter.variants = variants,
            Err(reason) => iter.notes.push(reason),
        }
        iter.compilers = order_compilers(definition, request, config, inherited);
        if iter.compilers.is_empty() {
            iter.notes.push(match &request.constraints.compiler {
                Some(wanted) => format!("no configured compiler satisfies %{wanted}"),
                None => "no compiler is configured".to_string(),
            });
        }
        iter.targets = order_targets(definition, request, config, inherited);
        if iter.targets.is_empty() {
            iter.notes.push(format!(
                "no configured target satisfies {}",
                request.constraints.arch.format_spec()
            ));
        }

        iter.exhausted = !iter.notes.is_empty();
        iter.cursor = vec![0; iter.variants.len() + 3];
        iter
    }

    /// The number of configurations this iterator produces in total
    pub fn len(&self) -> usize {
        if !self.notes.is_empty() {
            return 0;
        }
        self.lengths().into_iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lengths(&self) -> Vec<usize> {
        let mut lengths = Vec::with_capacity(self.cursor.len());
        lengths.push(self.versions.len());
        lengths.extend(self.variants.iter().map(|(_, values)| values.len()));
        lengths.push(self.compilers.len());
        lengths.push(self.targets.len());
        lengths
    }

    fn current(&self) -> Option<NodeAttrs> {
        let mut position = self.cursor.iter().copied();
        let version = self.versions.get(position.next()?)?.clone();
        let mut variants = VariantMap::default();
        for (name, values) in self.variants.iter() {
            variants.insert(name.clone(), values.get(position.next()?)?.clone());
        }
        let compiler = self.compilers.get(position.next()?)?.clone();
        let arch = self.targets.get(position.next()?)?.clone();
        Some(NodeAttrs {
            name: self.name.clone(),
            version,
            compiler,
            arch,
            variants,
        })
    }

    fn advance(&mut self) {
        let lengths = self.lengths();
        for (digit, length) in self.cursor.iter_mut().zip(lengths).rev() {
            *digit += 1;
            if *digit < length {
                return;
            }
            *digit = 0;
        }
        self.exhausted = true;
    }
}

#[async_trait::async_trait]
impl CandidateIterator for BuildIterator {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(attrs) = self.current() else {
            self.exhausted = true;
            return Ok(None);
        };
        self.advance();
        Ok(Some(Candidate::Package {
            attrs,
            source: PackageSource::Build,
        }))
    }

    fn notes(&self) -> Vec<String> {
        self.notes
            .iter()
            .map(|note| format!("cannot build {}: {note}", self.name))
            .collect()
    }
}

fn version_class(decl: &VersionDecl) -> u8 {
    if decl.deprecated {
        3
    } else if decl.preferred {
        0
    } else if decl.version.is_infinity() {
        2
    } else {
        1
    }
}

/// Versions that satisfy the request: configured preferences, then
/// versions flagged as preferred, then newest first with infinity
/// versions and deprecated versions last.
fn order_versions(
    definition: &PackageDefinition,
    request: &PkgRequest,
    config: &Config,
) -> Vec<Version> {
    let wanted = &request.constraints.versions;
    let preferences = config.version_preferences(definition.name());
    let rank = |version: &Version| {
        preferences
            .iter()
            .position(|p| p.contains(version).is_ok())
            .unwrap_or(preferences.len())
    };
    let mut versions: Vec<Version> = definition
        .versions()
        .iter()
        .filter(|decl| wanted.contains(&decl.version).is_ok())
        // declarations are already newest first, which a stable sort keeps
        .sorted_by_key(|decl| (rank(&decl.version), version_class(decl)))
        .map(|decl| decl.version.clone())
        .collect();
    if let Some(exact) = wanted.as_exact() {
        // a revision is built from source control and needs no declaration
        if exact.is_revision() && definition.version(exact).is_none() {
            versions.push(exact.clone());
        }
    }
    versions
}

/// The values to try for each variant, in variant name order.
///
/// A requested value is the only one tried. Otherwise configured
/// preferences come before the declared default.
fn order_variants(
    definition: &PackageDefinition,
    request: &PkgRequest,
    config: &Config,
) -> std::result::Result<Vec<(VariantNameBuf, Vec<VariantValue>)>, String> {
    for name in request.constraints.variants.keys() {
        if definition.variant(name).is_none() {
            return Err(format!("{} has no variant named '{name}'", definition.name()));
        }
    }
    let preferences = config.variant_preferences(definition.name());
    let mut ordered = Vec::new();
    for decl in definition.variants() {
        let values = match request.constraints.variants.get(&decl.name) {
            Some(wanted) => vec![decl.value_for(wanted)?],
            None => {
                let mut values = decl.candidate_values();
                let preferred = preferences
                    .iter()
                    .filter_map(|spec| spec.constraints.variants.get(&decl.name))
                    .find_map(|wanted| decl.value_for(wanted).ok());
                if let Some(preferred) = preferred {
                    values.retain(|v| *v != preferred);
                    values.insert(0, preferred);
                }
                values
            }
        };
        ordered.push((decl.name.clone(), values));
    }
    Ok(ordered)
}

/// Compilers that satisfy the request: the requester's compiler,
/// then configured preferences, then by name with the newest
/// version first.
fn order_compilers(
    definition: &PackageDefinition,
    request: &PkgRequest,
    config: &Config,
    inherited: Option<&NodeAttrs>,
) -> Vec<Compiler> {
    let wanted = request.constraints.compiler.as_ref();
    let admits = |compiler: &Compiler| wanted.is_none_or(|w| w.satisfied_by(compiler).is_ok());
    let mut compilers: Vec<Compiler> = config
        .compilers
        .iter()
        .filter(|c| admits(c))
        .cloned()
        .collect();

    let inherited = inherited.map(|attrs| &attrs.compiler);
    if let Some(compiler) = inherited {
        if admits(compiler) && !compilers.contains(compiler) {
            compilers.push(compiler.clone());
        }
    }
    if let Some(wanted) = wanted {
        if let Some(version) = wanted.versions.as_exact() {
            let exact = Compiler::new(wanted.name.clone(), version.clone());
            if !compilers.contains(&exact) {
                compilers.push(exact);
            }
        }
    }

    let preferences = config.compiler_preferences(definition.name());
    compilers.sort_by(|a, b| {
        let key = |c: &Compiler| {
            (
                Some(c) != inherited,
                preferences
                    .iter()
                    .position(|p| p.satisfied_by(c).is_ok())
                    .unwrap_or(preferences.len()),
            )
        };
        key(a)
            .cmp(&key(b))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| b.version.cmp(&a.version))
    });
    compilers
}

/// Targets that satisfy the request: the requester's target, then
/// the configured preference, then the default, then by name.
fn order_targets(
    definition: &PackageDefinition,
    request: &PkgRequest,
    config: &Config,
    inherited: Option<&NodeAttrs>,
) -> Vec<Arch> {
    let wanted = &request.constraints.arch;
    let mut targets: Vec<Arch> = config
        .targets
        .iter()
        .filter(|a| wanted.satisfied_by(a).is_ok())
        .cloned()
        .collect();

    let inherited = inherited.map(|attrs| &attrs.arch);
    if let Some(arch) = inherited {
        if wanted.satisfied_by(arch).is_ok() && !targets.contains(arch) {
            targets.push(arch.clone());
        }
    }
    if let (Some(platform), Some(os), Some(target)) =
        (&wanted.platform, &wanted.os, &wanted.target)
    {
        let exact = Arch::new(platform, os, target);
        if !targets.contains(&exact) {
            targets.push(exact);
        }
    }

    let preferred = config.target_preference(definition.name());
    let default = config.default_target();
    targets.sort_by_cached_key(|arch| {
        (
            Some(arch) != inherited,
            Some(arch.target.as_str()) != preferred,
            Some(arch) != default,
            arch.to_string(),
        )
    });
    targets
}
