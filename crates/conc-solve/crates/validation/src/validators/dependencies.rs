// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use super::prelude::*;

/// Ensures that the requests a node makes of its dependencies can
/// hold alongside everything already decided.
///
/// Dependencies that are resolved must satisfy the new request,
/// those that are not must still have a consistent merged request.
#[derive(Clone, Copy, Debug)]
pub struct DependenciesValidator {}

impl ValidatorT for DependenciesValidator {
    fn validate_node(
        &self,
        state: &State,
        node: &SolvedNode,
        requests: &[PkgRequest],
    ) -> crate::Result<Compatibility> {
        for request in requests {
            let compat = check_request(state, request);
            if let Compatibility::Incompatible(reason) = compat {
                return Ok(Compatibility::incompatible(format!(
                    "depends on {}: {reason}",
                    request.key
                )));
            }
        }

        // installed dependency graphs pin the providers they were built with
        for edge in node.dependencies.iter().filter(|e| !e.is_virtual()) {
            for virtual_name in edge.virtuals.iter() {
                let Some(provider) = state.get_provider(virtual_name) else {
                    continue;
                };
                if *provider != *edge.target.name {
                    return Ok(Compatibility::incompatible(format!(
                        "was built with {} as {virtual_name}, but {provider} provides it",
                        edge.target.name
                    )));
                }
            }
        }
        Ok(Compatibility::Compatible)
    }
}

fn check_request(state: &State, request: &PkgRequest) -> Compatibility {
    let merged = match merge_with_existing(state, request) {
        Ok(merged) => merged,
        Err(reason) => return Compatibility::Incompatible(reason),
    };

    if let Ok(resolved) = state.get_current_resolve(&request.key) {
        return merged.is_satisfied_by(&resolved.attrs, resolved.source.installed_hash());
    }

    if request.key.is_split() {
        return Compatibility::Compatible;
    }
    let Some(provider) = state.get_provider(&request.key.name) else {
        return Compatibility::Compatible;
    };
    // a virtual, which is only checked once its provider is resolved
    let Ok(resolved) = state.get_current_resolve(&NodeKey::new(provider.to_owned())) else {
        return Compatibility::Compatible;
    };
    resolved.definition.provides_virtual(
        &request.key.name,
        &merged.constraints.versions,
        &resolved.attrs,
    )
}

fn merge_with_existing(state: &State, request: &PkgRequest) -> Result<PkgRequest, String> {
    match state.get_merged_request(&request.key) {
        Ok(mut existing) => {
            existing.restrict(request).map_err(|err| err.to_string())?;
            Ok(existing)
        }
        Err(GetMergedRequestError::NoRequestFor(_)) => Ok(request.clone()),
        Err(err) => Err(err.reason()),
    }
}
