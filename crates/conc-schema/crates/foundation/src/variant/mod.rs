// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::name::{VariantName, VariantNameBuf};
use crate::version::Compatibility;


/// The text used to spell boolean values
pub const TRUE: &str = "true";
pub const FALSE: &str = "false";

/// Create a concrete variant assignment from a simple mapping.
///
/// Boolean and string values become the matching [`VariantValue`],
/// arrays become multi-valued variants.
///
/// ```
/// # #[macro_use] extern crate conc_schema_foundation;
/// # fn main() {
/// variant_map!{
///   "shared" => true,
///   "build_type" => "Release",
///   "languages" => ["c", "cxx"],
/// };
/// # }
/// ```
#[macro_export]
macro_rules! variant_map {
    ($($k:expr => $v:expr),* $(,)?) => {{
        #[allow(unused_imports)]
        use $crate::variant::{VariantMap, VariantValue};
        #[allow(unused_mut)]
        let mut map = VariantMap::default();
        $(map.insert(
            $crate::name::VariantNameBuf::try_from($k).expect("invalid variant name"),
            VariantValue::from($v),
        );)*
        map
    }};
}

/// The resolved value of one variant on a concrete node.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    Bool(bool),
    Single(String),
    Multi(BTreeSet<String>),
}

impl VariantValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VariantValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Every value held, as text
    pub fn values(&self) -> BTreeSet<String> {
        match self {
            VariantValue::Bool(b) => BTreeSet::from([b.to_string()]),
            VariantValue::Single(s) => BTreeSet::from([s.clone()]),
            VariantValue::Multi(m) => m.clone(),
        }
    }
}

impl std::fmt::Display for VariantValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantValue::Bool(b) => b.fmt(f),
            VariantValue::Single(s) => s.fmt(f),
            VariantValue::Multi(m) => f.write_str(&m.iter().join(",")),
        }
    }
}

impl From<bool> for VariantValue {
    fn from(value: bool) -> Self {
        VariantValue::Bool(value)
    }
}

impl From<&str> for VariantValue {
    fn from(value: &str) -> Self {
        VariantValue::Single(value.to_owned())
    }
}

impl From<String> for VariantValue {
    fn from(value: String) -> Self {
        VariantValue::Single(value)
    }
}

impl<const N: usize> From<[&str; N]> for VariantValue {
    fn from(values: [&str; N]) -> Self {
        VariantValue::Multi(values.iter().map(|v| v.to_string()).collect())
    }
}

/// A constraint placed on one variant by an abstract spec.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantRequest {
    /// `+name` or `~name`
    Bool(bool),
    /// `name=a,b`
    Values(BTreeSet<String>),
}

impl VariantRequest {
    /// Build a request from the values given in a `name=value[,value]` clause.
    ///
    /// A lone `true` or `false` becomes a boolean request.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.len() == 1 {
            if values.contains(TRUE) {
                return VariantRequest::Bool(true);
            }
            if values.contains(FALSE) {
                return VariantRequest::Bool(false);
            }
        }
        VariantRequest::Values(values)
    }

    /// Check whether a resolved value meets this request.
    ///
    /// A request for several values is met by a multi-valued variant
    /// holding at least those values.
    pub fn satisfied_by(&self, value: &VariantValue) -> Compatibility {
        let ok = match (self, value) {
            (VariantRequest::Bool(want), VariantValue::Bool(have)) => want == have,
            (VariantRequest::Bool(_), _) => false,
            (VariantRequest::Values(want), VariantValue::Multi(have)) => want.is_subset(have),
            (VariantRequest::Values(want), VariantValue::Single(have)) => {
                want.len() == 1 && want.contains(have)
            }
            (VariantRequest::Values(want), VariantValue::Bool(have)) => {
                want.len() == 1 && want.contains(&have.to_string())
            }
        };
        if ok {
            Compatibility::Compatible
        } else {
            Compatibility::incompatible(format!("wanted {self}, got {value}"))
        }
    }

    /// Combine two requests for the same variant.
    ///
    /// Opposite booleans cannot be combined. Value requests accumulate,
    /// which only a multi-valued variant can then satisfy.
    pub fn merge(&self, other: &VariantRequest) -> std::result::Result<VariantRequest, String> {
        match (self, other) {
            (VariantRequest::Bool(a), VariantRequest::Bool(b)) if a == b => Ok(self.clone()),
            (VariantRequest::Values(a), VariantRequest::Values(b)) => {
                Ok(VariantRequest::Values(a.union(b).cloned().collect()))
            }
            _ => Err(format!("{self} and {other} cannot both hold")),
        }
    }

    /// Format this request as spec text for the named variant
    pub fn format_for(&self, name: &VariantName) -> String {
        match self {
            VariantRequest::Bool(true) => format!("+{name}"),
            VariantRequest::Bool(false) => format!("~{name}"),
            VariantRequest::Values(values) => format!("{name}={}", values.iter().join(",")),
        }
    }
}

impl std::fmt::Display for VariantRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantRequest::Bool(b) => b.fmt(f),
            VariantRequest::Values(values) => f.write_str(&values.iter().join(",")),
        }
    }
}

impl From<bool> for VariantRequest {
    fn from(value: bool) -> Self {
        VariantRequest::Bool(value)
    }
}

impl From<&str> for VariantRequest {
    fn from(value: &str) -> Self {
        VariantRequest::from_values(value.split(','))
    }
}

/// The full variant assignment of a concrete node
#[derive(Default, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantMap(BTreeMap<VariantNameBuf, VariantValue>);

impl std::ops::Deref for VariantMap {
    type Target = BTreeMap<VariantNameBuf, VariantValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for VariantMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(VariantNameBuf, VariantValue)> for VariantMap {
    fn from_iter<T: IntoIterator<Item = (VariantNameBuf, VariantValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for VariantMap {
    type Item = (VariantNameBuf, VariantValue);
    type IntoIter = std::collections::btree_map::IntoIter<VariantNameBuf, VariantValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl VariantMap {
    /// Format these variants as spec text, eg `+shared build_type=Release`
    pub fn format_spec(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = match value {
                VariantValue::Bool(true) => write!(out, "+{name}"),
                VariantValue::Bool(false) => write!(out, "~{name}"),
                other => write!(out, "{name}={other}"),
            };
        }
        out
    }
}

impl std::fmt::Display for VariantMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_spec())
    }
}

/// The variant constraints of an abstract spec node
#[derive(Default, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantRequests(BTreeMap<VariantNameBuf, VariantRequest>);

impl std::ops::Deref for VariantRequests {
    type Target = BTreeMap<VariantNameBuf, VariantRequest>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for VariantRequests {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(VariantNameBuf, VariantRequest)> for VariantRequests {
    fn from_iter<T: IntoIterator<Item = (VariantNameBuf, VariantRequest)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl VariantRequests {
    /// Check every request against a concrete assignment.
    ///
    /// Variants missing from the assignment are not satisfied.
    pub fn satisfied_by(&self, variants: &VariantMap) -> Compatibility {
        for (name, request) in self.iter() {
            let Some(value) = variants.get(name) else {
                return Compatibility::incompatible(format!("no variant named '{name}'"));
            };
            if let Compatibility::Incompatible(reason) = request.satisfied_by(value) {
                return Compatibility::incompatible(format!("variant {name}: {reason}"));
            }
        }
        Compatibility::Compatible
    }

    /// Merge another set of requests into this one.
    pub fn constrain(&mut self, other: &VariantRequests) -> std::result::Result<(), String> {
        for (name, request) in other.iter() {
            let merged = match self.get(name) {
                Some(existing) => existing
                    .merge(request)
                    .map_err(|err| format!("variant {name}: {err}"))?,
                None => request.clone(),
            };
            self.0.insert(name.clone(), merged);
        }
        Ok(())
    }

    /// Format these requests as spec text, eg `+shared ~debug build_type=Release`
    pub fn format_spec(&self) -> String {
        self.iter()
            .map(|(name, request)| request.format_for(name))
            .join(" ")
    }
}
