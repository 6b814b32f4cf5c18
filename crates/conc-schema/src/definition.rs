// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::abstract_spec::ResolvedNodes;
use crate::build_system::{BUILD_SYSTEM_VARIANT, BuildSystem, BuildSystemT};
use crate::edge::{EdgeType, EdgeTypes, default_edge_types};
use crate::foundation::digest::Digest;
use crate::foundation::name::{PkgName, PkgNameBuf, VariantName, VariantNameBuf};
use crate::foundation::variant::{VariantMap, VariantRequest, VariantValue};
use crate::foundation::version::{Compatibility, Version};
use crate::foundation::version_range::VersionList;
use crate::{AbstractSpec, Constraints, InvalidPackageError, NodeAttrs};

#[cfg(test)]
#[path = "./definition_test.rs"]
mod definition_test;

/// One known version of a package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionDecl {
    pub version: Version,
    /// Chosen ahead of newer versions
    pub preferred: bool,
    /// Only chosen when nothing else fits
    pub deprecated: bool,
}

/// The values that a variant may take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariantDomain {
    Bool,
    /// Exactly one value, from the list when it is not empty
    Single(Vec<String>),
    /// Any set of values, from the list when it is not empty
    Multi(Vec<String>),
}

/// A build option declared by a package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantDecl {
    pub name: VariantNameBuf,
    pub domain: VariantDomain,
    pub default: VariantValue,
    pub description: Option<String>,
}

impl VariantDecl {
    /// Check that a value belongs to this variant's domain
    pub fn admits(&self, value: &VariantValue) -> Compatibility {
        let ok = match (&self.domain, value) {
            (VariantDomain::Bool, VariantValue::Bool(_)) => true,
            (VariantDomain::Single(values), VariantValue::Single(v)) => {
                values.is_empty() || values.contains(v)
            }
            (VariantDomain::Multi(values), VariantValue::Multi(vs)) => {
                !vs.is_empty() && (values.is_empty() || vs.iter().all(|v| values.contains(v)))
            }
            _ => false,
        };
        if ok {
            Compatibility::Compatible
        } else {
            Compatibility::incompatible(format!(
                "{value} is not a legal value for variant {}",
                self.name
            ))
        }
    }

    /// Every value worth trying when nothing is requested, default first.
    ///
    /// Multi-valued variants only offer their default.
    pub fn candidate_values(&self) -> Vec<VariantValue> {
        let mut values = vec![self.default.clone()];
        match &self.domain {
            VariantDomain::Bool => {
                if let VariantValue::Bool(b) = self.default {
                    values.push(VariantValue::Bool(!b));
                }
            }
            VariantDomain::Single(options) => values.extend(
                options
                    .iter()
                    .map(|v| VariantValue::Single(v.clone()))
                    .filter(|v| *v != self.default),
            ),
            VariantDomain::Multi(_) => {}
        }
        values
    }

    /// The value that an explicit request assigns to this variant.
    ///
    /// A multi-valued variant gets exactly the requested set.
    pub fn value_for(&self, request: &VariantRequest) -> Result<VariantValue, String> {
        let value = match (&self.domain, request) {
            (VariantDomain::Bool, VariantRequest::Bool(b)) => VariantValue::Bool(*b),
            (VariantDomain::Single(_), VariantRequest::Values(values)) if values.len() == 1 => {
                let value = values.iter().next().cloned().unwrap_or_default();
                VariantValue::Single(value)
            }
            (VariantDomain::Multi(_), VariantRequest::Values(values)) => {
                VariantValue::Multi(values.clone())
            }
            _ => {
                return Err(format!(
                    "{} cannot be assigned to variant {}",
                    request.format_for(&self.name),
                    self.name
                ));
            }
        };
        match self.admits(&value) {
            Compatibility::Compatible => Ok(value),
            Compatibility::Incompatible(reason) => Err(reason),
        }
    }
}

/// A dependency, possibly only present under some condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyDecl {
    /// The dependency and the constraints placed on it
    pub spec: AbstractSpec,
    pub types: EdgeTypes,
    /// Evaluated against the depending node's own attributes
    pub when: Option<AbstractSpec>,
}

impl DependencyDecl {
    pub fn name(&self) -> Option<&PkgName> {
        self.spec.name.as_deref()
    }

    /// True if this dependency is present for a node with these attributes
    pub fn applies_to(&self, attrs: &NodeAttrs) -> bool {
        self.when
            .as_ref()
            .map(|when| when.head_satisfied_by(attrs, None).is_ok())
            .unwrap_or(true)
    }
}

/// A declaration that a package implements a virtual package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvidesDecl {
    /// The virtual name and the range of its versions provided
    pub spec: AbstractSpec,
    pub when: Option<AbstractSpec>,
}

impl ProvidesDecl {
    pub fn virtual_name(&self) -> Option<&PkgName> {
        self.spec.name.as_deref()
    }

    /// Check that this declaration provides the virtual at some
    /// version in `versions`, for a node with these attributes.
    pub fn provides(&self, versions: &VersionList, attrs: &NodeAttrs) -> Compatibility {
        if let Some(when) = &self.when {
            if let Compatibility::Incompatible(reason) = when.head_satisfied_by(attrs, None) {
                return Compatibility::incompatible(format!(
                    "only provides {} when {when}: {reason}",
                    self.spec
                ));
            }
        }
        if self.spec.constraints.versions.intersection(versions).is_empty() {
            return Compatibility::incompatible(format!(
                "provides {} which does not overlap @{versions}",
                self.spec
            ));
        }
        Compatibility::Compatible
    }
}

/// An attribute combination that must never be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictDecl {
    /// Anonymous or naming the declaring package for its own
    /// attributes, or naming another package found anywhere in
    /// the graph
    pub spec: AbstractSpec,
    pub when: Option<AbstractSpec>,
    pub message: Option<String>,
}

impl ConflictDecl {
    /// Check whether this conflict holds for the declaring node
    /// within a complete or partial resolution.
    ///
    /// Parts that refer to packages not yet resolved do not hold.
    pub fn is_triggered<R>(&self, owner: &NodeAttrs, hash: Option<&Digest>, nodes: &R) -> bool
    where
        R: ResolvedNodes + ?Sized,
    {
        let when_holds = match &self.when {
            None => true,
            Some(when) => when.satisfied_by(owner, hash, nodes).is_ok(),
        };
        if !when_holds {
            return false;
        }
        let head_holds = match self.spec.name.as_deref() {
            None => self.spec.constraints.satisfied_by(owner, hash).is_ok(),
            Some(name) if *name == *owner.name => {
                self.spec.constraints.satisfied_by(owner, hash).is_ok()
            }
            Some(name) => nodes
                .resolved(name)
                .into_iter()
                .any(|(attrs, hash)| self.spec.constraints.satisfied_by(attrs, hash).is_ok()),
        };
        head_holds && self.spec.dependencies_satisfied_by(nodes).is_ok()
    }

    pub fn describe(&self, owner: &PkgName) -> String {
        let mut text = format!("{owner} conflicts with '{}'", self.spec);
        if let Some(when) = &self.when {
            text.push_str(&format!(" when '{when}'"));
        }
        if let Some(message) = &self.message {
            text.push_str(&format!(": {message}"));
        }
        text
    }
}

/// Everything known about one package, as loaded from its definition.
///
/// Definitions are validated on load and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDefinition")]
pub struct PackageDefinition {
    name: PkgNameBuf,
    versions: Vec<VersionDecl>,
    variants: BTreeMap<VariantNameBuf, VariantDecl>,
    dependencies: Vec<DependencyDecl>,
    provides: Vec<ProvidesDecl>,
    conflicts: Vec<ConflictDecl>,
    build_systems: Vec<BuildSystem>,
    unification_exempt: bool,
}

impl PackageDefinition {
    pub fn name(&self) -> &PkgName {
        &self.name
    }

    /// Known versions, newest first
    pub fn versions(&self) -> &[VersionDecl] {
        &self.versions
    }

    pub fn version(&self, version: &Version) -> Option<&VersionDecl> {
        self.versions.iter().find(|v| v.version == *version)
    }

    pub fn variants(&self) -> impl Iterator<Item = &VariantDecl> {
        self.variants.values()
    }

    pub fn variant(&self, name: &VariantName) -> Option<&VariantDecl> {
        self.variants.get(name)
    }

    /// Every variant set to its default value
    pub fn default_variants(&self) -> VariantMap {
        self.variants
            .values()
            .map(|v| (v.name.clone(), v.default.clone()))
            .collect()
    }

    pub fn dependencies(&self) -> &[DependencyDecl] {
        &self.dependencies
    }

    /// The dependencies present for a node with these attributes.
    ///
    /// Test dependencies are only included when asked for.
    pub fn active_dependencies<'a>(
        &'a self,
        attrs: &'a NodeAttrs,
        include_test: bool,
    ) -> impl Iterator<Item = (&'a DependencyDecl, EdgeTypes)> + 'a {
        self.dependencies.iter().filter_map(move |dep| {
            if !dep.applies_to(attrs) {
                return None;
            }
            let types: EdgeTypes = dep
                .types
                .iter()
                .copied()
                .filter(|t| include_test || *t != EdgeType::Test)
                .collect();
            if types.is_empty() {
                return None;
            }
            Some((dep, types))
        })
    }

    pub fn provides(&self) -> &[ProvidesDecl] {
        &self.provides
    }

    /// The names of every virtual package this package may provide
    pub fn provided_virtuals(&self) -> BTreeSet<&PkgName> {
        self.provides
            .iter()
            .filter_map(ProvidesDecl::virtual_name)
            .collect()
    }

    /// Check that a node with these attributes provides the named
    /// virtual at one of the given versions.
    pub fn provides_virtual(
        &self,
        name: &PkgName,
        versions: &VersionList,
        attrs: &NodeAttrs,
    ) -> Compatibility {
        let mut reasons = Vec::new();
        for decl in self.provides.iter() {
            if decl.virtual_name() != Some(name) {
                continue;
            }
            match decl.provides(versions, attrs) {
                Compatibility::Compatible => return Compatibility::Compatible,
                Compatibility::Incompatible(reason) => reasons.push(reason),
            }
        }
        if reasons.is_empty() {
            return Compatibility::incompatible(format!("{} does not provide {name}", self.name));
        }
        Compatibility::Incompatible(reasons.join("; "))
    }

    /// The declarations that could make this package provide the virtual
    /// at one of the given versions, ignoring conditions.
    pub fn provides_for<'a>(
        &'a self,
        name: &'a PkgName,
        versions: &'a VersionList,
    ) -> impl Iterator<Item = &'a ProvidesDecl> + 'a {
        self.provides.iter().filter(move |decl| {
            decl.virtual_name() == Some(name)
                && !decl.spec.constraints.versions.intersection(versions).is_empty()
        })
    }

    pub fn conflicts(&self) -> &[ConflictDecl] {
        &self.conflicts
    }

    pub fn build_systems(&self) -> &[BuildSystem] {
        &self.build_systems
    }

    pub fn is_unification_exempt(&self) -> bool {
        self.unification_exempt
    }

    /// Check the variants of a candidate node against the declared domains
    pub fn check_variants(&self, variants: &VariantMap) -> Compatibility {
        for (name, value) in variants.iter() {
            let Some(decl) = self.variants.get(name) else {
                return Compatibility::incompatible(format!(
                    "{} has no variant named '{name}'",
                    self.name
                ));
            };
            if let Compatibility::Incompatible(reason) = decl.admits(value) {
                return Compatibility::Incompatible(reason);
            }
        }
        for name in self.variants.keys() {
            if !variants.contains_key(name) {
                return Compatibility::incompatible(format!("variant '{name}' is not set"));
            }
        }
        Compatibility::Compatible
    }
}

impl std::fmt::Display for PackageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name.fmt(f)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Plain(Version),
    Detailed {
        version: Version,
        #[serde(default)]
        preferred: bool,
        #[serde(default)]
        deprecated: bool,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVariantValue {
    Bool(bool),
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVariant {
    default: RawVariantValue,
    #[serde(default)]
    values: Vec<String>,
    #[serde(default)]
    multi: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Short(AbstractSpec),
    Full {
        spec: AbstractSpec,
        #[serde(default)]
        types: Option<EdgeTypes>,
        #[serde(default)]
        when: Option<AbstractSpec>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProvides {
    Short(AbstractSpec),
    Full {
        spec: AbstractSpec,
        #[serde(default)]
        when: Option<AbstractSpec>,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConflict {
    spec: AbstractSpec,
    #[serde(default)]
    when: Option<AbstractSpec>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    name: PkgNameBuf,
    #[serde(default)]
    versions: Vec<RawVersion>,
    #[serde(default)]
    variants: BTreeMap<VariantNameBuf, RawVariant>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    provides: Vec<RawProvides>,
    #[serde(default)]
    conflicts: Vec<RawConflict>,
    #[serde(default)]
    build_systems: Vec<BuildSystem>,
    #[serde(default)]
    unification_exempt: bool,
}

/// Validates the conditions of a definition against its own variants.
struct DefinitionChecker<'a> {
    name: &'a PkgName,
    variants: &'a BTreeMap<VariantNameBuf, VariantDecl>,
}

impl DefinitionChecker<'_> {
    fn invalid<M: Into<String>>(&self, message: M) -> InvalidPackageError {
        InvalidPackageError::new(self.name, message)
    }

    /// A condition on the declaring package's own attributes
    fn check_condition(&self, what: &str, when: &AbstractSpec) -> Result<(), InvalidPackageError> {
        if let Some(name) = &when.name {
            if *name != *self.name {
                return Err(self.invalid(format!(
                    "{what} condition '{when}' must not name another package"
                )));
            }
        }
        if !when.dependencies.is_empty() {
            return Err(self.invalid(format!(
                "{what} condition '{when}' must not constrain dependencies"
            )));
        }
        self.check_own_variants(what, &when.constraints)
    }

    fn check_own_variants(
        &self,
        what: &str,
        constraints: &Constraints,
    ) -> Result<(), InvalidPackageError> {
        for variant in constraints.variants.keys() {
            if !self.variants.contains_key(variant) {
                return Err(self.invalid(format!(
                    "{what} refers to undeclared variant '{variant}'"
                )));
            }
        }
        Ok(())
    }
}

fn make_variant(
    package: &PkgName,
    name: VariantNameBuf,
    raw: RawVariant,
) -> Result<VariantDecl, InvalidPackageError> {
    let invalid = |message: String| InvalidPackageError::new(package, message);
    let (domain, default) = match (raw.default, raw.multi) {
        (RawVariantValue::Bool(b), false) if raw.values.is_empty() => {
            (VariantDomain::Bool, VariantValue::Bool(b))
        }
        (RawVariantValue::Bool(_), _) => {
            return Err(invalid(format!(
                "boolean variant '{name}' cannot list values or be multi-valued"
            )));
        }
        (RawVariantValue::One(value), false) => {
            (VariantDomain::Single(raw.values), VariantValue::Single(value))
        }
        (RawVariantValue::Many(_), false) => {
            return Err(invalid(format!(
                "variant '{name}' has several defaults but is not multi-valued"
            )));
        }
        (RawVariantValue::One(value), true) => (
            VariantDomain::Multi(raw.values),
            VariantValue::Multi(BTreeSet::from([value])),
        ),
        (RawVariantValue::Many(values), true) => (
            VariantDomain::Multi(raw.values),
            VariantValue::Multi(values.into_iter().collect()),
        ),
    };
    let decl = VariantDecl {
        name,
        domain,
        default,
        description: raw.description,
    };
    if let Compatibility::Incompatible(reason) = decl.admits(&decl.default) {
        return Err(invalid(format!("invalid default: {reason}")));
    }
    Ok(decl)
}

impl TryFrom<RawDefinition> for PackageDefinition {
    type Error = InvalidPackageError;

    fn try_from(raw: RawDefinition) -> Result<Self, Self::Error> {
        let name = raw.name;
        let invalid = |message: String| InvalidPackageError::new(&name, message);

        let mut versions = Vec::with_capacity(raw.versions.len());
        for raw_version in raw.versions {
            let (version, preferred, deprecated) = match raw_version {
                RawVersion::Plain(version) => (version, false, false),
                RawVersion::Detailed {
                    version,
                    preferred,
                    deprecated,
                } => (version, preferred, deprecated),
            };
            if versions.iter().any(|v: &VersionDecl| v.version == version) {
                return Err(invalid(format!("version {version} is declared twice")));
            }
            versions.push(VersionDecl {
                version,
                preferred,
                deprecated,
            });
        }
        versions.sort_by(|a, b| b.version.cmp(&a.version));

        let mut variants = BTreeMap::new();
        for (variant_name, raw_variant) in raw.variants {
            if *variant_name == *BUILD_SYSTEM_VARIANT && !raw.build_systems.is_empty() {
                return Err(invalid(format!(
                    "variant '{BUILD_SYSTEM_VARIANT}' is reserved for the declared build systems"
                )));
            }
            let decl = make_variant(&name, variant_name.clone(), raw_variant)?;
            variants.insert(variant_name, decl);
        }

        let mut build_systems: Vec<BuildSystem> = Vec::new();
        for bs in raw.build_systems {
            if build_systems.contains(&bs) {
                return Err(invalid(format!("build system {bs} is listed twice")));
            }
            build_systems.push(bs);
        }
        if let Some(first) = build_systems.first() {
            let variant_name = VariantNameBuf::try_from(BUILD_SYSTEM_VARIANT)
                .map_err(|err| invalid(err.to_string()))?;
            variants.insert(
                variant_name.clone(),
                VariantDecl {
                    name: variant_name,
                    domain: VariantDomain::Single(
                        build_systems.iter().map(ToString::to_string).collect(),
                    ),
                    default: VariantValue::Single(first.to_string()),
                    description: Some("the build system used to build the package".into()),
                },
            );
        }

        let checker = DefinitionChecker {
            name: &name,
            variants: &variants,
        };

        let mut dependencies = Vec::with_capacity(raw.dependencies.len());
        for raw_dep in raw.dependencies {
            let (spec, types, when) = match raw_dep {
                RawDependency::Short(spec) => (spec, None, None),
                RawDependency::Full { spec, types, when } => (spec, types, when),
            };
            let Some(dep_name) = spec.name.as_deref() else {
                return Err(invalid(format!("dependency '{spec}' must name a package")));
            };
            if *dep_name == *name {
                return Err(invalid("a package cannot depend on itself".to_string()));
            }
            if let Some(when) = &when {
                checker.check_condition("dependency", when)?;
            }
            let types = types.unwrap_or_else(default_edge_types);
            if types.is_empty() {
                return Err(invalid(format!("dependency '{spec}' has no edge types")));
            }
            dependencies.push(DependencyDecl { spec, types, when });
        }
        for bs in build_systems.iter() {
            let when = AbstractSpec::parse_anonymous(&format!("{BUILD_SYSTEM_VARIANT}={bs}"))
                .map_err(|err| invalid(err.to_string()))?;
            for implicit in bs.implicit_dependencies() {
                let dep_name: PkgNameBuf = implicit
                    .name
                    .parse()
                    .map_err(|err: crate::foundation::name::Error| invalid(err.to_string()))?;
                if dep_name == name {
                    continue;
                }
                dependencies.push(DependencyDecl {
                    spec: AbstractSpec::named(&dep_name),
                    types: implicit.types,
                    when: Some(when.clone()),
                });
            }
        }

        let mut provides = Vec::with_capacity(raw.provides.len());
        for raw_provides in raw.provides {
            let (spec, when) = match raw_provides {
                RawProvides::Short(spec) => (spec, None),
                RawProvides::Full { spec, when } => (spec, when),
            };
            match spec.name.as_deref() {
                None => return Err(invalid(format!("provided spec '{spec}' has no name"))),
                Some(virtual_name) if *virtual_name == *name => {
                    return Err(invalid("a package cannot provide itself".to_string()));
                }
                Some(_) => {}
            }
            if let Some(when) = &when {
                checker.check_condition("provides", when)?;
            }
            provides.push(ProvidesDecl { spec, when });
        }

        let mut conflicts = Vec::with_capacity(raw.conflicts.len());
        for raw_conflict in raw.conflicts {
            if raw_conflict.spec.is_empty() {
                return Err(invalid("a conflict must constrain something".to_string()));
            }
            if raw_conflict.spec.is_anonymous() {
                checker.check_own_variants("conflict", &raw_conflict.spec.constraints)?;
            }
            if let Some(when) = &raw_conflict.when {
                if when.name.as_ref().is_some_and(|n| *n != name) {
                    return Err(invalid(format!(
                        "conflict condition '{when}' must not name another package"
                    )));
                }
                checker.check_own_variants("conflict condition", &when.constraints)?;
            }
            conflicts.push(ConflictDecl {
                spec: raw_conflict.spec,
                when: raw_conflict.when,
                message: raw_conflict.msg,
            });
        }

        Ok(Self {
            name,
            versions,
            variants,
            dependencies,
            provides,
            conflicts,
            build_systems,
            unification_exempt: raw.unification_exempt,
        })
    }
}
