// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::foundation::digest::Digest;
use crate::foundation::name::{PkgName, PkgNameBuf};
use crate::foundation::version::Compatibility;
use crate::{ConcreteSpec, ConflictError, Constraints, Error, NodeAttrs, Result, parsing};

#[cfg(test)]
#[path = "./abstract_spec_test.rs"]
mod abstract_spec_test;

/// Read access to the resolved nodes of a full or partial resolution,
/// used to evaluate `^dependency` predicates.
pub trait ResolvedNodes {
    /// Every resolved configuration of the named package.
    ///
    /// Hashes are only known for installed or finished nodes.
    fn resolved<'a>(&'a self, name: &PkgName) -> Vec<(&'a NodeAttrs, Option<&'a Digest>)>;
}

impl ResolvedNodes for ConcreteSpec {
    fn resolved<'a>(&'a self, name: &PkgName) -> Vec<(&'a NodeAttrs, Option<&'a Digest>)> {
        self.find(name)
            .into_iter()
            .map(|node| (node.attrs(), Some(node.hash())))
            .collect()
    }
}

/// A partially specified package request.
///
/// The root may be anonymous, in which case it is a predicate on
/// whatever node it is evaluated against. Dependencies given with
/// `^` constrain the named package wherever it appears in the
/// resolved graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AbstractSpec {
    pub name: Option<PkgNameBuf>,
    pub constraints: Constraints,
    pub dependencies: Vec<AbstractSpec>,
}

impl AbstractSpec {
    pub fn new(name: PkgNameBuf, constraints: Constraints) -> Self {
        Self {
            name: Some(name),
            constraints,
            dependencies: Vec::new(),
        }
    }

    /// A spec for the named package with no constraints
    pub fn named(name: &PkgName) -> Self {
        Self::new(name.to_owned(), Constraints::default())
    }

    pub fn anonymous(constraints: Constraints) -> Self {
        Self {
            name: None,
            constraints,
            dependencies: Vec::new(),
        }
    }

    /// Parse spec text that may omit the package name, as used
    /// for `when` clauses and conflict declarations.
    pub fn parse_anonymous(text: &str) -> Result<Self> {
        parsing::parse_spec(text, true)
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    /// True if this spec places no constraint at all
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.constraints.is_empty() && self.dependencies.is_empty()
    }

    pub fn dependency(&self, name: &PkgName) -> Option<&AbstractSpec> {
        self.dependencies
            .iter()
            .find(|d| d.name.as_deref() == Some(name))
    }

    /// Merge another spec's constraints into this one.
    ///
    /// Names must agree unless one side is anonymous. Dependency
    /// constraints are merged by name. On failure this spec is left
    /// unchanged.
    pub fn constrain(&mut self, other: &AbstractSpec) -> std::result::Result<(), ConflictError> {
        let mut merged = self.clone();
        match (&merged.name, &other.name) {
            (Some(a), Some(b)) if a != b => {
                return Err(ConflictError::new(a, b).with_reason("package names differ"));
            }
            (None, Some(b)) => merged.name = Some(b.clone()),
            _ => {}
        }
        merged.constraints.constrain(&other.constraints)?;
        for dep in other.dependencies.iter() {
            match merged
                .dependencies
                .iter_mut()
                .find(|d| d.name == dep.name)
            {
                Some(existing) => existing.constrain(dep)?,
                None => merged.dependencies.push(dep.clone()),
            }
        }
        *self = merged;
        Ok(())
    }

    /// Check this spec's root against a single node.
    ///
    /// Dependency constraints are ignored, see [`Self::satisfied_by`].
    pub fn head_satisfied_by(&self, attrs: &NodeAttrs, hash: Option<&Digest>) -> Compatibility {
        if let Some(name) = &self.name {
            if *name != attrs.name {
                return Compatibility::incompatible(format!("{} is not {name}", attrs.name));
            }
        }
        self.constraints.satisfied_by(attrs, hash)
    }

    /// Check this spec against a node and the resolution it belongs to.
    ///
    /// Every `^dependency` must be matched by at least one resolved
    /// node of that name.
    pub fn satisfied_by<R>(
        &self,
        attrs: &NodeAttrs,
        hash: Option<&Digest>,
        nodes: &R,
    ) -> Compatibility
    where
        R: ResolvedNodes + ?Sized,
    {
        self.head_satisfied_by(attrs, hash)
            .and_then(|| self.dependencies_satisfied_by(nodes))
    }

    /// Check only the `^dependency` part of this spec.
    pub fn dependencies_satisfied_by<R>(&self, nodes: &R) -> Compatibility
    where
        R: ResolvedNodes + ?Sized,
    {
        for dep in self.dependencies.iter() {
            let Some(name) = &dep.name else {
                continue;
            };
            let candidates = nodes.resolved(name);
            if candidates.is_empty() {
                return Compatibility::incompatible(format!("does not depend on {name}"));
            }
            let mut reasons = Vec::new();
            let found = candidates.iter().any(|(attrs, hash)| {
                match dep.constraints.satisfied_by(attrs, *hash) {
                    Compatibility::Compatible => true,
                    Compatibility::Incompatible(reason) => {
                        reasons.push(reason);
                        false
                    }
                }
            });
            if !found {
                return Compatibility::incompatible(format!(
                    "^{dep} not satisfied: {}",
                    reasons.join("; ")
                ));
            }
        }
        Compatibility::Compatible
    }

    /// Check a whole concrete graph against this spec, using its roots.
    pub fn satisfied_by_spec(&self, spec: &ConcreteSpec) -> Compatibility {
        let mut reasons = Vec::new();
        for root in spec.root_nodes() {
            match self.satisfied_by(root.attrs(), Some(root.hash()), spec) {
                Compatibility::Compatible => return Compatibility::Compatible,
                Compatibility::Incompatible(reason) => reasons.push(reason),
            }
        }
        if reasons.is_empty() {
            return Compatibility::incompatible("the spec has no roots");
        }
        Compatibility::Incompatible(reasons.join("; "))
    }
}

impl std::fmt::Display for AbstractSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let constraints = self.constraints.format_spec();
        if let Some(name) = &self.name {
            name.fmt(f)?;
            if !constraints.is_empty() && !constraints.starts_with('@') {
                f.write_str(" ")?;
            }
        }
        f.write_str(&constraints)?;
        for dep in self.dependencies.iter() {
            write!(f, " ^{dep}")?;
        }
        Ok(())
    }
}

impl FromStr for AbstractSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parsing::parse_spec(s, false)
    }
}

impl TryFrom<&str> for AbstractSpec {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

impl Serialize for AbstractSpec {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AbstractSpec {
    /// Deserialization accepts anonymous specs, callers that need a
    /// package name must check for one.
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AbstractSpec::parse_anonymous(&s).map_err(serde::de::Error::custom)
    }
}
