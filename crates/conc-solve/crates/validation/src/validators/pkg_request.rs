// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use super::prelude::*;

/// Ensures that a node meets every request made for it so far.
#[derive(Clone, Copy, Debug)]
pub struct PkgRequestValidator {}

impl ValidatorT for PkgRequestValidator {
    fn validate_node(
        &self,
        state: &State,
        node: &SolvedNode,
        _requests: &[PkgRequest],
    ) -> crate::Result<Compatibility> {
        let request = match state.get_merged_request(&node.key) {
            Ok(request) => request,
            Err(GetMergedRequestError::NoRequestFor(_)) => {
                return Ok(Compatibility::incompatible(format!(
                    "package '{}' was not requested",
                    node.key
                )));
            }
            Err(err) => {
                return Ok(Compatibility::incompatible(format!(
                    "package '{}' has an invalid request stack: {}",
                    node.key,
                    err.reason()
                )));
            }
        };
        Ok(request.is_satisfied_by(&node.attrs, node.source.installed_hash()))
    }
}
