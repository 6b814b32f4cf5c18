// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::name::{PkgName, PkgNameBuf};
use crate::version::{Compatibility, Version, parse_version};
use crate::version_range::{VersionList, parse_version_list};

/// Separates a compiler name from its version
pub const VERSION_SIGIL: char = '@';

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("Invalid compiler '{text}': {message}")]
#[diagnostic(code(conc::invalid_compiler))]
pub struct InvalidCompilerError {
    pub text: String,
    pub message: String,
}

/// A fully identified toolchain, eg `gcc@11.2.0`
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Compiler {
    pub name: PkgNameBuf,
    pub version: Version,
}

impl Compiler {
    pub fn new(name: PkgNameBuf, version: Version) -> Self {
        Self { name, version }
    }
}

impl std::fmt::Display for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{VERSION_SIGIL}{}", self.name, self.version)
    }
}

impl FromStr for Compiler {
    type Err = InvalidCompilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| InvalidCompilerError {
            text: s.to_owned(),
            message,
        };
        let (name, version) = s
            .split_once(VERSION_SIGIL)
            .ok_or_else(|| invalid("expected <name>@<version>".into()))?;
        Ok(Self {
            name: PkgNameBuf::from_str(name).map_err(|err| invalid(err.to_string()))?,
            version: parse_version(version).map_err(|err| invalid(err.to_string()))?,
        })
    }
}

impl Serialize for Compiler {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Compiler {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A constraint on the toolchain, eg `%gcc` or `%gcc@9:10`
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CompilerSpec {
    pub name: PkgNameBuf,
    pub versions: VersionList,
}

impl CompilerSpec {
    pub fn new(name: PkgNameBuf, versions: VersionList) -> Self {
        Self { name, versions }
    }

    /// A constraint that admits any version of the named compiler
    pub fn any_version(name: &PkgName) -> Self {
        Self::new(name.to_owned(), VersionList::any())
    }

    pub fn satisfied_by(&self, compiler: &Compiler) -> Compatibility {
        if self.name != compiler.name {
            return Compatibility::incompatible(format!(
                "compiler {compiler} is not {}",
                self.name
            ));
        }
        self.versions.contains(&compiler.version)
    }

    /// Combine two compiler constraints into one.
    pub fn constrain(&self, other: &CompilerSpec) -> Result<CompilerSpec, String> {
        if self.name != other.name {
            return Err(format!("compilers {self} and {other} differ"));
        }
        let versions = self.versions.intersection(&other.versions);
        if versions.is_empty() {
            return Err(format!("compiler versions of {self} and {other} do not overlap"));
        }
        Ok(CompilerSpec::new(self.name.clone(), versions))
    }
}

impl From<&Compiler> for CompilerSpec {
    fn from(compiler: &Compiler) -> Self {
        Self::new(
            compiler.name.clone(),
            VersionList::exact(compiler.version.clone()),
        )
    }
}

impl std::fmt::Display for CompilerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name.fmt(f)?;
        if !self.versions.is_any() {
            write!(f, "{VERSION_SIGIL}{}", self.versions)?;
        }
        Ok(())
    }
}

impl FromStr for CompilerSpec {
    type Err = InvalidCompilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| InvalidCompilerError {
            text: s.to_owned(),
            message,
        };
        let (name, versions) = match s.split_once(VERSION_SIGIL) {
            Some((name, versions)) => (
                name,
                parse_version_list(versions).map_err(|err| invalid(err.to_string()))?,
            ),
            None => (s, VersionList::any()),
        };
        Ok(Self {
            name: PkgNameBuf::from_str(name).map_err(|err| invalid(err.to_string()))?,
            versions,
        })
    }
}

impl Serialize for CompilerSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CompilerSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
