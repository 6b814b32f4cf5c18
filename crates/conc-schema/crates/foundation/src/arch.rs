// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::Compatibility;

#[cfg(test)]
#[path = "./arch_test.rs"]
mod arch_test;

/// Separates the parts of an architecture triplet
pub const ARCH_SEP: char = '-';

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("Invalid architecture '{0}': expected <platform>-<os>-<target>")]
#[diagnostic(code(conc::invalid_arch))]
pub struct InvalidArchError(pub String);

fn is_legal_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'))
}

/// The platform, operating system and microarchitecture of a build,
/// eg `linux-ubuntu22.04-x86_64`
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Arch {
    pub platform: String,
    pub os: String,
    pub target: String,
}

impl Arch {
    pub fn new<P, O, T>(platform: P, os: O, target: T) -> Self
    where
        P: Into<String>,
        O: Into<String>,
        T: Into<String>,
    {
        Self {
            platform: platform.into(),
            os: os.into(),
            target: target.into(),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{ARCH_SEP}{}{ARCH_SEP}{}",
            self.platform, self.os, self.target
        )
    }
}

impl FromStr for Arch {
    type Err = InvalidArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(ARCH_SEP);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(platform), Some(os), Some(target), None)
                if [platform, os, target].into_iter().all(is_legal_part) =>
            {
                Ok(Arch::new(platform, os, target))
            }
            _ => Err(InvalidArchError(s.to_owned())),
        }
    }
}

impl Serialize for Arch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Arch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A partial constraint on the architecture of a build.
///
/// Each part that is set must match exactly.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct ArchSpec {
    pub platform: Option<String>,
    pub os: Option<String>,
    pub target: Option<String>,
}

impl ArchSpec {
    pub fn is_empty(&self) -> bool {
        self.platform.is_none() && self.os.is_none() && self.target.is_none()
    }

    /// Check a single part of this spec, where `name` is one of
    /// `platform`, `os` or `target`.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "platform" => self.platform.as_deref(),
            "os" => self.os.as_deref(),
            "target" => self.target.as_deref(),
            _ => None,
        }
    }

    pub fn satisfied_by(&self, arch: &Arch) -> Compatibility {
        let checks = [
            ("platform", &self.platform, &arch.platform),
            ("os", &self.os, &arch.os),
            ("target", &self.target, &arch.target),
        ];
        for (what, want, have) in checks {
            if let Some(want) = want {
                if want != have {
                    return Compatibility::incompatible(format!("{what} {have} is not {want}"));
                }
            }
        }
        Compatibility::Compatible
    }

    /// Combine two partial architecture constraints.
    pub fn constrain(&self, other: &ArchSpec) -> Result<ArchSpec, String> {
        fn merge(
            what: &str,
            a: &Option<String>,
            b: &Option<String>,
        ) -> Result<Option<String>, String> {
            match (a, b) {
                (Some(a), Some(b)) if a != b => {
                    Err(format!("{what}={a} conflicts with {what}={b}"))
                }
                (Some(a), _) => Ok(Some(a.clone())),
                (None, b) => Ok(b.clone()),
            }
        }
        Ok(ArchSpec {
            platform: merge("platform", &self.platform, &other.platform)?,
            os: merge("os", &self.os, &other.os)?,
            target: merge("target", &self.target, &other.target)?,
        })
    }

    /// Format as spec text, eg `platform=linux target=x86_64`
    pub fn format_spec(&self) -> String {
        if let (Some(p), Some(o), Some(t)) = (&self.platform, &self.os, &self.target) {
            return format!("arch={p}{ARCH_SEP}{o}{ARCH_SEP}{t}");
        }
        [
            ("platform", &self.platform),
            ("os", &self.os),
            ("target", &self.target),
        ]
        .into_iter()
        .filter_map(|(what, value)| value.as_ref().map(|v| format!("{what}={v}")))
        .collect::<Vec<_>>()
        .join(" ")
    }
}

impl From<&Arch> for ArchSpec {
    fn from(arch: &Arch) -> Self {
        Self {
            platform: Some(arch.platform.clone()),
            os: Some(arch.os.clone()),
            target: Some(arch.target.clone()),
        }
    }
}

impl std::fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_spec())
    }
}
