// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// When a dependency is needed by the package that declares it.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EdgeType {
    Build,
    Link,
    Run,
    Test,
}

/// The set of edge types of one dependency
pub type EdgeTypes = BTreeSet<EdgeType>;

/// The edge types used when a declaration names none
pub fn default_edge_types() -> EdgeTypes {
    BTreeSet::from([EdgeType::Build, EdgeType::Link])
}

/// Format edge types as a compact list, eg `build,link`
pub fn format_edge_types(types: &EdgeTypes) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
