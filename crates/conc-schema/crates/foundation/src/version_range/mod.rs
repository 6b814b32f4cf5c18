// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;
use std::str::FromStr;

use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use nom::combinator::all_consuming;
use nom::error::convert_error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::{Compatibility, Version};

mod error;
mod intersection;
pub mod parsing;

pub use error::{Error, Result};

#[cfg(test)]
#[path = "./version_range_test.rs"]
mod version_range_test;

/// Separates the lower and upper bounds of a range
pub const RANGE_SEP: char = ':';
/// Separates alternative ranges in a list
pub const LIST_SEP: char = ',';
/// Marks a range as an exact version
pub const EXACT_MARK: char = '=';

/// The common interface of every kind of version range.
#[enum_dispatch]
pub trait Ranged: Display + Clone + Into<VersionRange> {
    /// The lower, inclusive bound of this range
    fn lower_bound(&self) -> Option<&Version>;

    /// The upper bound of this range.
    ///
    /// Upper bounds are inclusive and also admit any version that
    /// they are a prefix of.
    fn upper_bound(&self) -> Option<&Version>;

    /// Check if the given version falls inside this range
    fn contains(&self, version: &Version) -> Compatibility;

    /// The single version admitted by this range, if that is all it admits
    fn as_exact(&self) -> Option<&Version> {
        None
    }
}

/// Matches only the identical version, eg `=1.2`
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExactVersion {
    version: Version,
}

impl ExactVersion {
    pub fn new(version: Version) -> Self {
        Self { version }
    }
}

impl Ranged for ExactVersion {
    fn lower_bound(&self) -> Option<&Version> {
        Some(&self.version)
    }

    fn upper_bound(&self) -> Option<&Version> {
        Some(&self.version)
    }

    fn contains(&self, version: &Version) -> Compatibility {
        if *version == self.version {
            Compatibility::Compatible
        } else {
            Compatibility::incompatible(format!("{version} is not exactly {}", self.version))
        }
    }

    fn as_exact(&self) -> Option<&Version> {
        Some(&self.version)
    }
}

impl Display for ExactVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{EXACT_MARK}{}", self.version)
    }
}

/// Matches a version and every version that it is a prefix of, eg `1.2`
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PrefixVersion {
    version: Version,
}

impl PrefixVersion {
    pub fn new(version: Version) -> Self {
        Self { version }
    }
}

impl Ranged for PrefixVersion {
    fn lower_bound(&self) -> Option<&Version> {
        Some(&self.version)
    }

    fn upper_bound(&self) -> Option<&Version> {
        Some(&self.version)
    }

    fn contains(&self, version: &Version) -> Compatibility {
        if self.version.is_prefix_of(version) {
            Compatibility::Compatible
        } else {
            Compatibility::incompatible(format!("{version} does not start with {}", self.version))
        }
    }

    fn as_exact(&self) -> Option<&Version> {
        // revisions have no children
        self.version.is_revision().then_some(&self.version)
    }
}

impl Display for PrefixVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.version.fmt(f)
    }
}

/// An inclusive, possibly open-ended range, eg `1.2:1.4`, `1.2:`, `:`
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BoundedRange {
    lower: Option<Version>,
    upper: Option<Version>,
}

impl BoundedRange {
    pub fn new(lower: Option<Version>, upper: Option<Version>) -> Self {
        Self { lower, upper }
    }

    /// A range that admits every version
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }
}

impl Ranged for BoundedRange {
    fn lower_bound(&self) -> Option<&Version> {
        self.lower.as_ref()
    }

    fn upper_bound(&self) -> Option<&Version> {
        self.upper.as_ref()
    }

    fn contains(&self, version: &Version) -> Compatibility {
        if version.is_revision() && version.release_segments().is_none() {
            // bare revisions have no place in the release order
            return if self.is_unbounded() {
                Compatibility::Compatible
            } else {
                Compatibility::incompatible(format!(
                    "{version} is a revision with no equivalent release and cannot satisfy {self}"
                ))
            };
        }
        if let Some(lower) = &self.lower {
            if version < lower {
                return Compatibility::incompatible(format!(
                    "{version} is below the lower bound {lower}"
                ));
            }
        }
        if let Some(upper) = &self.upper {
            if version > upper && !upper.is_prefix_of(version) {
                return Compatibility::incompatible(format!(
                    "{version} is above the upper bound {upper}"
                ));
            }
        }
        Compatibility::Compatible
    }
}

impl Display for BoundedRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(lower) = &self.lower {
            lower.fmt(f)?;
        }
        f.write_fmt(format_args!("{RANGE_SEP}"))?;
        if let Some(upper) = &self.upper {
            upper.fmt(f)?;
        }
        Ok(())
    }
}

/// Any single version range.
#[enum_dispatch(Ranged)]
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionRange {
    Exact(ExactVersion),
    Prefix(PrefixVersion),
    Bounded(BoundedRange),
}

impl Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionRange::Exact(r) => r.fmt(f),
            VersionRange::Prefix(r) => r.fmt(f),
            VersionRange::Bounded(r) => r.fmt(f),
        }
    }
}

impl VersionRange {
    /// Compute the range of versions admitted by both ranges.
    ///
    /// Returns `None` when no version could satisfy both.
    pub fn intersection(&self, other: &VersionRange) -> Option<VersionRange> {
        intersection::intersect(self, other)
    }
}

/// A union of version ranges, as written in `@1.2:1.4,1.6`.
///
/// An empty list admits nothing and represents a constraint that
/// can never be satisfied.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct VersionList {
    ranges: Vec<VersionRange>,
}

impl Default for VersionList {
    fn default() -> Self {
        Self::any()
    }
}

impl VersionList {
    pub fn new(ranges: Vec<VersionRange>) -> Self {
        let ranges = ranges.into_iter().unique().collect();
        Self { ranges }
    }

    /// A list that admits every version
    pub fn any() -> Self {
        Self {
            ranges: vec![BoundedRange::unbounded().into()],
        }
    }

    /// A list that admits only the given version
    pub fn exact(version: Version) -> Self {
        Self {
            ranges: vec![ExactVersion::new(version).into()],
        }
    }

    pub fn ranges(&self) -> &[VersionRange] {
        &self.ranges
    }

    pub fn is_any(&self) -> bool {
        self.ranges
            .iter()
            .any(|r| matches!(r, VersionRange::Bounded(b) if b.is_unbounded()))
    }

    /// True if this list cannot be satisfied by any version
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The single version admitted by this list, if that is all it admits
    pub fn as_exact(&self) -> Option<&Version> {
        match self.ranges.as_slice() {
            [single] => single.as_exact(),
            _ => None,
        }
    }

    pub fn contains(&self, version: &Version) -> Compatibility {
        if self.ranges.iter().any(|r| r.contains(version).is_ok()) {
            return Compatibility::Compatible;
        }
        Compatibility::incompatible(format!("version {version} does not satisfy @{self}"))
    }

    /// The versions admitted by both lists.
    ///
    /// The result is empty when the lists are disjoint.
    pub fn intersection(&self, other: &VersionList) -> VersionList {
        if other.is_any() {
            return self.clone();
        }
        if self.is_any() {
            return other.clone();
        }
        let ranges = self
            .ranges
            .iter()
            .cartesian_product(other.ranges.iter())
            .filter_map(|(a, b)| a.intersection(b))
            .collect();
        VersionList::new(ranges)
    }

    /// True if every version admitted by other is admitted by this list.
    ///
    /// This is only exact for ranges, not for prefix matching of
    /// upper bounds against unknown versions.
    pub fn is_superset_of(&self, other: &VersionList) -> bool {
        self.intersection(other) == *other
    }
}

impl From<VersionRange> for VersionList {
    fn from(range: VersionRange) -> Self {
        Self {
            ranges: vec![range],
        }
    }
}

impl Display for VersionList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ranges.is_empty() {
            // no valid text form exists for the empty list
            return f.write_str("<none>");
        }
        f.write_str(&self.ranges.iter().join(&LIST_SEP.to_string()))
    }
}

impl FromStr for VersionList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_version_list(s)
    }
}

/// Parse a version list, eg `1.2:1.4,=1.6`
pub fn parse_version_list<S: AsRef<str>>(text: S) -> Result<VersionList> {
    let text = text.as_ref();
    all_consuming(parsing::version_list::<nom::error::VerboseError<&str>>)(text)
        .map(|(_, v)| v)
        .map_err(|err| match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                Error::InvalidRange(convert_error(text, e))
            }
            nom::Err::Incomplete(_) => unreachable!(),
        })
}

impl Serialize for VersionList {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct VersionListVisitor;

        impl serde::de::Visitor<'_> for VersionListVisitor {
            type Value = VersionList;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a version range (eg: 1.2, 1.2:1.4, =1.2.3, :)")
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                parse_version_list(value).map_err(serde::de::Error::custom)
            }

            fn visit_u64<E>(self, value: u64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&value.to_string())
            }

            fn visit_f64<E>(self, value: f64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&value.to_string())
            }
        }

        deserializer.deserialize_any(VersionListVisitor)
    }
}
