// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::foundation::digest::Digest;
use crate::foundation::name::{PkgName, PkgNameBuf};
use crate::foundation::version::Compatibility;
use crate::{AbstractSpec, ConflictError, Constraints, NodeAttrs};

#[cfg(test)]
#[path = "./request_test.rs"]
mod request_test;

/// Identifies one node being resolved.
///
/// Most packages resolve to a single node per graph. A package that is
/// exempt from unification is resolved separately for each dependent,
/// which is recorded in `split_for`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub name: PkgNameBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_for: Option<PkgNameBuf>,
}

impl NodeKey {
    pub fn new(name: PkgNameBuf) -> Self {
        Self {
            name,
            split_for: None,
        }
    }

    /// The key for a separate resolution of `name` on behalf of `dependent`
    pub fn split(name: PkgNameBuf, dependent: &PkgName) -> Self {
        Self {
            name,
            split_for: Some(dependent.to_owned()),
        }
    }

    pub fn is_split(&self) -> bool {
        self.split_for.is_some()
    }
}

impl From<&PkgName> for NodeKey {
    fn from(name: &PkgName) -> Self {
        Self::new(name.to_owned())
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.split_for {
            None => self.name.fmt(f),
            Some(dependent) => write!(f, "{}[for {dependent}]", self.name),
        }
    }
}

/// Whether a request forces its package into the resolution.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionPolicy {
    /// The package must be resolved
    #[default]
    Always,
    /// The request only constrains the package if something else
    /// brings it into the resolution
    IfAlreadyPresent,
}

impl InclusionPolicy {
    pub fn is_default(&self) -> bool {
        matches!(self, InclusionPolicy::Always)
    }
}

impl std::fmt::Display for InclusionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{self:?}"))
    }
}

/// What made a [`PkgRequest`].
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestedBy {
    /// One of the specs given to the solver
    CommandLine,
    /// A dependency of a resolved node
    Package(NodeKey),
    /// The provider chosen for a virtual package
    Virtual(PkgNameBuf),
    /// A pinned dependency of a reused installation
    Installed(Digest),
    /// For requests made temporarily, where the requester is never read
    DoesNotMatter,
    /// For a request made in the unit tests
    #[cfg(test)]
    InternalTest,
}

impl std::fmt::Display for RequestedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestedBy::CommandLine => write!(f, "command line"),
            RequestedBy::Package(key) => write!(f, "{key}"),
            RequestedBy::Virtual(name) => write!(f, "virtual {name}"),
            RequestedBy::Installed(hash) => write!(f, "installation /{}", hash.short()),
            RequestedBy::DoesNotMatter => write!(f, "n/a"),
            #[cfg(test)]
            RequestedBy::InternalTest => write!(f, "conc's test suite"),
        }
    }
}

/// A desired package and the constraints on how it is configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PkgRequest {
    pub key: NodeKey,
    pub constraints: Constraints,
    pub inclusion_policy: InclusionPolicy,
    /// Requesters, grouped by the text of the part of the request
    /// that they made
    pub requested_by: BTreeMap<String, Vec<RequestedBy>>,
}

impl std::hash::Hash for PkgRequest {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.constraints.hash(state);
        self.inclusion_policy.hash(state);
        // requesters do not change the identity of a request
    }
}

impl PkgRequest {
    pub fn new(key: NodeKey, constraints: Constraints, requester: RequestedBy) -> Self {
        let part = constraints.to_string();
        Self {
            key,
            constraints,
            inclusion_policy: InclusionPolicy::Always,
            requested_by: BTreeMap::from([(part, vec![requester])]),
        }
    }

    /// Expand an abstract spec into the requests it makes.
    ///
    /// The named root is always requested, every `^dependency`
    /// only if something else brings it in.
    pub fn from_spec(spec: &AbstractSpec, requester: RequestedBy) -> Vec<Self> {
        let mut requests = Vec::with_capacity(spec.dependencies.len() + 1);
        if let Some(name) = &spec.name {
            requests.push(Self::new(
                NodeKey::new(name.clone()),
                spec.constraints.clone(),
                requester.clone(),
            ));
        }
        for dep in spec.dependencies.iter() {
            let Some(name) = &dep.name else {
                continue;
            };
            requests.push(
                Self::new(
                    NodeKey::new(name.clone()),
                    dep.constraints.clone(),
                    requester.clone(),
                )
                .with_inclusion(InclusionPolicy::IfAlreadyPresent),
            );
        }
        requests
    }

    pub fn name(&self) -> &PkgName {
        &self.key.name
    }

    pub fn with_inclusion(mut self, inclusion_policy: InclusionPolicy) -> Self {
        self.inclusion_policy = inclusion_policy;
        self
    }

    pub fn add_requester(&mut self, requester: RequestedBy) {
        let part = self.constraints.to_string();
        let requesters = self.requested_by.entry(part).or_default();
        if !requesters.contains(&requester) {
            requesters.push(requester);
        }
    }

    /// Return a list of the things that made this request
    pub fn get_requesters(&self) -> Vec<RequestedBy> {
        self.requested_by.values().flatten().cloned().collect()
    }

    /// True if every requester is one of the specs given to the solver
    pub fn is_from_command_line(&self) -> bool {
        self.get_requesters()
            .iter()
            .all(|r| matches!(r, RequestedBy::CommandLine))
    }

    /// Reduce the scope of this request to the intersection with another.
    ///
    /// The merged request is required if either side is. On failure
    /// this request is left unchanged.
    pub fn restrict(&mut self, other: &PkgRequest) -> Result<(), ConflictError> {
        if self.key.name != other.key.name {
            return Err(ConflictError::new(&self.key, &other.key)
                .with_reason("requests are for different packages"));
        }
        let mut constraints = self.constraints.clone();
        constraints.constrain(&other.constraints).map_err(|err| {
            err.with_reason(format!(
                "{} cannot satisfy both {} and {}",
                self.key,
                self.format_constraints(),
                other.format_constraints()
            ))
        })?;
        self.constraints = constraints;
        // Always sorts first
        self.inclusion_policy = self.inclusion_policy.min(other.inclusion_policy);
        for (part, requesters) in other.requested_by.iter() {
            let existing = self.requested_by.entry(part.clone()).or_default();
            for requester in requesters {
                if !existing.contains(requester) {
                    existing.push(requester.clone());
                }
            }
        }
        Ok(())
    }

    /// Check a resolved node against this request.
    pub fn is_satisfied_by(&self, attrs: &NodeAttrs, hash: Option<&Digest>) -> Compatibility {
        if attrs.name != self.key.name {
            return Compatibility::incompatible(format!(
                "{} does not satisfy a request for {}",
                attrs.name, self.key.name
            ));
        }
        self.constraints.satisfied_by(attrs, hash)
    }

    fn format_constraints(&self) -> String {
        if self.constraints.is_empty() {
            "any configuration".to_string()
        } else {
            self.constraints.to_string()
        }
    }
}

impl std::fmt::Display for PkgRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let constraints = self.constraints.format_spec();
        self.key.fmt(f)?;
        if !constraints.is_empty() && !constraints.starts_with('@') {
            f.write_str(" ")?;
        }
        f.write_str(&constraints)
    }
}
