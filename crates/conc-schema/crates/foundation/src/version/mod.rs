// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

mod compat;
mod error;
pub mod parsing;

pub use compat::Compatibility;
pub use error::{Error, InvalidVersionError, Result};

use std::cmp::Ordering;
use std::str::FromStr;

use nom::combinator::all_consuming;
use nom::error::convert_error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};


/// Characters that split a version string into segments
pub const SEGMENT_SEPARATORS: &[char] = &['.', '_', '-'];

/// Prefix that marks a version as a reference to a source revision
pub const GIT_PREFIX: &str = "git.";

/// Words that sort above any numbered release, highest first.
pub const INFINITY_WORDS: &[&str] = &["develop", "main", "master", "head", "trunk", "stable"];

/// One component of a version, eg the `2` or `rc` in `1.2rc1`
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Segment {
    Number(u64),
    Word(String),
}

impl Segment {
    /// The rank of this segment among the infinity words, if it is one.
    ///
    /// Higher values sort later.
    fn infinity_rank(&self) -> Option<usize> {
        match self {
            Segment::Number(_) => None,
            Segment::Word(word) => INFINITY_WORDS
                .iter()
                .position(|w| w.eq_ignore_ascii_case(word))
                .map(|pos| INFINITY_WORDS.len() - pos),
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Number(n) => n.fmt(f),
            Segment::Word(w) => w.fmt(f),
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.infinity_rank(), other.infinity_rank()) {
            (Some(a), Some(b)) => return a.cmp(&b),
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => {}
        }
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => a.cmp(b),
            (Segment::Word(a), Segment::Word(b)) => a.cmp(b),
            // plain words are pre-release markers, eg 1.2rc
            (Segment::Number(_), Segment::Word(_)) => Ordering::Greater,
            (Segment::Word(_), Segment::Number(_)) => Ordering::Less,
        }
    }
}

fn cmp_segments(a: &[Segment], b: &[Segment]) -> Ordering {
    for (left, right) in a.iter().zip(b.iter()) {
        match left.cmp(right) {
            Ordering::Equal => continue,
            res => return res,
        }
    }
    a.len().cmp(&b.len())
}

/// Split a release string into its segments.
pub fn split_segments(text: &str) -> Result<Vec<Segment>> {
    if text.ends_with(SEGMENT_SEPARATORS) || text.starts_with(SEGMENT_SEPARATORS) {
        return Err(InvalidVersionError::new_error(format!(
            "version '{text}' cannot begin or end with a separator"
        )));
    }
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    let mut flush = |current: &mut String, is_digit: bool| -> Result<()> {
        if current.is_empty() {
            return Ok(());
        }
        let segment = if is_digit {
            current.parse::<u64>().map(Segment::Number).map_err(|err| {
                InvalidVersionError::new_error(format!(
                    "version segment '{current}' is not a valid number: {err}"
                ))
            })?
        } else {
            Segment::Word(current.clone())
        };
        segments.push(segment);
        current.clear();
        Ok(())
    };

    let mut last_was_separator = false;
    for c in text.chars() {
        if SEGMENT_SEPARATORS.contains(&c) {
            if last_was_separator {
                return Err(InvalidVersionError::new_error(format!(
                    "version '{text}' has an empty segment"
                )));
            }
            last_was_separator = true;
            flush(&mut current, current_is_digit)?;
            continue;
        }
        last_was_separator = false;
        if !c.is_ascii_alphanumeric() {
            return Err(InvalidVersionError::new_error(format!(
                "invalid character '{c}' in version '{text}'"
            )));
        }
        if !current.is_empty() && c.is_ascii_digit() != current_is_digit {
            flush(&mut current, current_is_digit)?;
        }
        current_is_digit = c.is_ascii_digit();
        current.push(c);
    }
    flush(&mut current, current_is_digit)?;

    if segments.is_empty() {
        return Err(InvalidVersionError::new_error(format!(
            "version '{text}' has no segments"
        )));
    }
    Ok(segments)
}

#[derive(Clone, Debug)]
enum VersionKind {
    Release(Vec<Segment>),
    /// A revision of the source, optionally declared to be
    /// equivalent to some release
    Revision {
        reference: String,
        equivalent: Option<Vec<Segment>>,
    },
}

/// A package version number or source revision.
///
/// Versions have a total order. Two versions are only equal when
/// their text is identical, so `1.2` and `1-2` sort next to each
/// other but remain distinct values.
#[derive(Clone, Debug)]
pub struct Version {
    text: String,
    kind: VersionKind,
}

impl Version {
    /// Parse a release version from its segments text, eg `1.2.3`.
    pub fn new_release(text: &str) -> Result<Self> {
        Ok(Self {
            text: text.to_owned(),
            kind: VersionKind::Release(split_segments(text)?),
        })
    }

    /// Create a revision version, eg `git.abc123` or `git.main=1.2`.
    pub fn new_revision(reference: &str, equivalent: Option<&str>) -> Result<Self> {
        if reference.is_empty() {
            return Err(InvalidVersionError::new_error(
                "revision reference cannot be empty".to_string(),
            ));
        }
        let equivalent_segments = equivalent.map(split_segments).transpose()?;
        let text = match equivalent {
            Some(eq) => format!("{GIT_PREFIX}{reference}={eq}"),
            None => format!("{GIT_PREFIX}{reference}"),
        };
        Ok(Self {
            text,
            kind: VersionKind::Revision {
                reference: reference.to_owned(),
                equivalent: equivalent_segments,
            },
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The segments that this version orders by, if any.
    ///
    /// Revisions without a declared equivalent have no release segments.
    pub fn release_segments(&self) -> Option<&[Segment]> {
        match &self.kind {
            VersionKind::Release(segments) => Some(segments),
            VersionKind::Revision { equivalent, .. } => equivalent.as_deref(),
        }
    }

    /// True if this version refers to a source revision
    pub fn is_revision(&self) -> bool {
        matches!(self.kind, VersionKind::Revision { .. })
    }

    /// The revision reference of this version, if it is one
    pub fn revision(&self) -> Option<&str> {
        match &self.kind {
            VersionKind::Release(_) => None,
            VersionKind::Revision { reference, .. } => Some(reference),
        }
    }

    /// True if this version is a development line, eg `develop`
    pub fn is_infinity(&self) -> bool {
        self.release_segments()
            .and_then(|s| s.first())
            .map(|s| s.infinity_rank().is_some())
            .unwrap_or(false)
    }

    /// True if every segment of this version begins the other.
    ///
    /// A version is a prefix of itself. Revisions are only
    /// prefixes of the identical revision.
    pub fn is_prefix_of(&self, other: &Version) -> bool {
        match (&self.kind, other.release_segments()) {
            (VersionKind::Release(mine), Some(theirs)) => theirs.starts_with(mine),
            (VersionKind::Release(_), None) => false,
            (VersionKind::Revision { .. }, _) => self.text == other.text,
        }
    }

    fn cmp_kind(&self, other: &Self) -> Ordering {
        use VersionKind::*;
        match (&self.kind, &other.kind) {
            (Release(a), Release(b)) => cmp_segments(a, b),
            (
                Revision {
                    equivalent: Some(a),
                    ..
                },
                Release(b),
            ) => cmp_segments(a, b).then(Ordering::Greater),
            (
                Release(a),
                Revision {
                    equivalent: Some(b),
                    ..
                },
            ) => cmp_segments(a, b).then(Ordering::Less),
            (Revision { equivalent: None, .. }, Release(_)) => Ordering::Less,
            (Release(_), Revision { equivalent: None, .. }) => Ordering::Greater,
            (
                Revision {
                    reference: ra,
                    equivalent: ea,
                },
                Revision {
                    reference: rb,
                    equivalent: eb,
                },
            ) => match (ea, eb) {
                (Some(a), Some(b)) => cmp_segments(a, b).then_with(|| ra.cmp(rb)),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => ra.cmp(rb),
            },
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.text.hash(state)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_kind(other)
            .then_with(|| self.text.cmp(&other.text))
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_version(s)
    }
}

impl TryFrom<&str> for Version {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

/// Parse a version string, reporting errors with a verbose trace.
pub fn parse_version<S: AsRef<str>>(version: S) -> Result<Version> {
    let version = version.as_ref();
    all_consuming(parsing::version::<nom::error::VerboseError<&str>>)(version)
        .map(|(_, v)| v)
        .map_err(|err| match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                InvalidVersionError::new_error(convert_error(version, e))
            }
            nom::Err::Incomplete(_) => unreachable!(),
        })
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct VersionVisitor;

        impl serde::de::Visitor<'_> for VersionVisitor {
            type Value = Version;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a version number (eg: 1.0.0, 1.0, 1, git.abc123)")
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                parse_version(value).map_err(serde::de::Error::custom)
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

        deserializer.deserialize_any(VersionVisitor)
    }
}
