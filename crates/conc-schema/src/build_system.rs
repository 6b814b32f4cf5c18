// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::edge::{EdgeType, EdgeTypes};
use crate::foundation::name::VariantName;
use crate::foundation::variant::VariantValue;
use crate::NodeAttrs;

#[cfg(test)]
#[path = "./build_system_test.rs"]
mod build_system_test;

/// The variant that records which build system a node is built with
pub const BUILD_SYSTEM_VARIANT: &str = "build_system";

/// A dependency that a build system adds to every package using it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImplicitDependency {
    pub name: &'static str,
    pub types: EdgeTypes,
}

impl ImplicitDependency {
    fn build(name: &'static str) -> Self {
        Self {
            name,
            types: EdgeTypes::from([EdgeType::Build]),
        }
    }
}

/// The behavior specific to one way of building a package.
#[enum_dispatch]
pub trait BuildSystemT {
    /// The dependencies added to every package built this way
    fn implicit_dependencies(&self) -> Vec<ImplicitDependency>;

    /// The build phases, in the order they run
    fn phases(&self) -> &'static [&'static str];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generic;

impl BuildSystemT for Generic {
    fn implicit_dependencies(&self) -> Vec<ImplicitDependency> {
        Vec::new()
    }

    fn phases(&self) -> &'static [&'static str] {
        &["install"]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Autotools;

impl BuildSystemT for Autotools {
    fn implicit_dependencies(&self) -> Vec<ImplicitDependency> {
        vec![ImplicitDependency::build("gmake")]
    }

    fn phases(&self) -> &'static [&'static str] {
        &["autoreconf", "configure", "build", "install"]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CMake;

impl BuildSystemT for CMake {
    fn implicit_dependencies(&self) -> Vec<ImplicitDependency> {
        vec![ImplicitDependency::build("cmake")]
    }

    fn phases(&self) -> &'static [&'static str] {
        &["cmake", "build", "install"]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Makefile;

impl BuildSystemT for Makefile {
    fn implicit_dependencies(&self) -> Vec<ImplicitDependency> {
        vec![ImplicitDependency::build("gmake")]
    }

    fn phases(&self) -> &'static [&'static str] {
        &["edit", "build", "install"]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Python;

impl BuildSystemT for Python {
    fn implicit_dependencies(&self) -> Vec<ImplicitDependency> {
        vec![ImplicitDependency {
            name: "python",
            types: EdgeTypes::from([EdgeType::Build, EdgeType::Run]),
        }]
    }

    fn phases(&self) -> &'static [&'static str] {
        &["install"]
    }
}

/// Every supported build system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[enum_dispatch(BuildSystemT)]
#[serde(try_from = "String", into = "String")]
pub enum BuildSystem {
    Generic(Generic),
    Autotools(Autotools),
    CMake(CMake),
    Makefile(Makefile),
    Python(Python),
}

impl BuildSystem {
    pub const ALL: [BuildSystem; 5] = [
        BuildSystem::Generic(Generic),
        BuildSystem::Autotools(Autotools),
        BuildSystem::CMake(CMake),
        BuildSystem::Makefile(Makefile),
        BuildSystem::Python(Python),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildSystem::Generic(_) => "generic",
            BuildSystem::Autotools(_) => "autotools",
            BuildSystem::CMake(_) => "cmake",
            BuildSystem::Makefile(_) => "makefile",
            BuildSystem::Python(_) => "python",
        }
    }

    /// The build system recorded on a resolved node.
    ///
    /// Nodes without the variant use the generic build system.
    pub fn of(attrs: &NodeAttrs) -> Option<BuildSystem> {
        // Safety: the constant is a legal variant name
        let name = unsafe { VariantName::from_str_unchecked(BUILD_SYSTEM_VARIANT) };
        match attrs.variants.get(name) {
            None => Some(BuildSystem::Generic(Generic)),
            Some(VariantValue::Single(value)) => value.parse().ok(),
            Some(_) => None,
        }
    }
}

impl std::fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|bs| bs.as_str() == s)
            .ok_or_else(|| format!("unknown build system '{s}'"))
    }
}

impl TryFrom<String> for BuildSystem {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BuildSystem> for String {
    fn from(value: BuildSystem) -> Self {
        value.as_str().to_string()
    }
}
