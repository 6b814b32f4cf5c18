// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! Leaf types shared by every conc crate: names, versions and
//! ranges, variants, compilers, architectures and digests.

pub mod arch;
pub mod compiler;
pub mod digest;
pub mod fixtures;
pub mod format;
mod from_yaml;
pub mod name;
pub mod variant;
pub mod version;
pub mod version_range;

pub use fixtures::*;
pub use from_yaml::{FromYaml, SerdeYamlError};
