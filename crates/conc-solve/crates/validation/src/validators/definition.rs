// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use super::prelude::*;

/// Ensures that a new build uses a declared version and legal variants.
///
/// Installed and external nodes describe what exists and are not
/// held to the current definition.
#[derive(Clone, Copy, Debug)]
pub struct DefinitionValidator {}

impl ValidatorT for DefinitionValidator {
    fn validate_node(
        &self,
        _state: &State,
        node: &SolvedNode,
        _requests: &[PkgRequest],
    ) -> crate::Result<Compatibility> {
        if !node.source.is_build() {
            return Ok(Compatibility::Compatible);
        }
        let version = &node.attrs.version;
        if node.definition.version(version).is_none() && !version.is_revision() {
            return Ok(Compatibility::incompatible(format!(
                "{} has no declared version {version}",
                node.name()
            )));
        }
        Ok(node.definition.check_variants(&node.attrs.variants))
    }
}
