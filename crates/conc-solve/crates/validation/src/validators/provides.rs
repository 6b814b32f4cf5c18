// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use super::prelude::*;

/// Ensures that a node chosen as the provider of a virtual really
/// provides it, at a version that was asked for.
#[derive(Clone, Copy, Debug)]
pub struct ProvidesValidator {}

impl ValidatorT for ProvidesValidator {
    fn validate_node(
        &self,
        state: &State,
        node: &SolvedNode,
        _requests: &[PkgRequest],
    ) -> crate::Result<Compatibility> {
        if node.key.is_split() {
            return Ok(Compatibility::Compatible);
        }
        for (virtual_name, provider) in state.get_providers().iter() {
            if *provider != *node.name() {
                continue;
            }
            let request = match state.get_merged_request(&NodeKey::new(virtual_name.clone())) {
                Ok(request) => request,
                // chosen for an installed dependency, nothing else asked
                Err(GetMergedRequestError::NoRequestFor(_)) => continue,
                Err(err) => return Ok(Compatibility::incompatible(err.reason())),
            };
            let compat = node.definition.provides_virtual(
                virtual_name,
                &request.constraints.versions,
                &node.attrs,
            );
            if !compat.is_ok() {
                return Ok(compat);
            }
        }
        Ok(Compatibility::Compatible)
    }
}
