// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_schema::foundation::digest::Digest;
use conc_schema::foundation::name::PkgNameBuf;
use conc_schema::{BuildSystem, BuildSystemT, ConcreteSpec};

use crate::{Error, Result};

#[cfg(test)]
#[path = "./plan_test.rs"]
mod plan_test;

/// One package to build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildStep {
    pub name: PkgNameBuf,
    pub hash: Digest,
    pub build_system: BuildSystem,
    pub phases: &'static [&'static str],
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} /{} ({}: {})",
            self.name,
            self.hash.short(),
            self.build_system,
            self.phases.join(", ")
        )
    }
}

/// The builds that produce a concrete graph, each after all of
/// its dependencies. External packages are never built.
pub fn build_plan(spec: &ConcreteSpec) -> Result<Vec<BuildStep>> {
    spec.nodes()
        .filter(|node| node.external_prefix().is_none())
        .map(|node| {
            let build_system = BuildSystem::of(node.attrs())
                .ok_or_else(|| Error::UnknownBuildSystem(node.name().to_owned()))?;
            Ok(BuildStep {
                name: node.name().to_owned(),
                hash: *node.hash(),
                build_system,
                phases: build_system.phases(),
            })
        })
        .collect()
}
