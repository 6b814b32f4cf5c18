// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_schema::foundation::digest::Digest;
use conc_schema::foundation::name::PkgName;
use conc_schema::{NodeAttrs, ResolvedNodes};

use super::prelude::*;

/// Ensures that no declared conflict holds once the node is added.
///
/// Both the conflicts declared by the node and those of every node
/// already resolved are evaluated, since either side can name the
/// other.
#[derive(Clone, Copy, Debug)]
pub struct ConflictsValidator {}

impl ValidatorT for ConflictsValidator {
    fn validate_node(
        &self,
        state: &State,
        node: &SolvedNode,
        _requests: &[PkgRequest],
    ) -> crate::Result<Compatibility> {
        let view = WithCandidate { state, node };
        let hash = node.source.installed_hash();
        for conflict in node.definition.conflicts() {
            if conflict.is_triggered(&node.attrs, hash, &view) {
                return Ok(Compatibility::Incompatible(conflict.describe(node.name())));
            }
        }
        for resolved in state.get_resolved_packages().values() {
            for conflict in resolved.definition.conflicts() {
                let installed = resolved.source.installed_hash();
                if conflict.is_triggered(&resolved.attrs, installed, &view) {
                    tracing::trace!(
                        candidate = %node,
                        with = %resolved.key,
                        "conflict declared by a resolved node"
                    );
                    return Ok(Compatibility::Incompatible(conflict.describe(resolved.name())));
                }
            }
        }
        Ok(Compatibility::Compatible)
    }
}

/// The resolved nodes of a state, as if the candidate were among them.
struct WithCandidate<'a> {
    state: &'a State,
    node: &'a SolvedNode,
}

impl ResolvedNodes for WithCandidate<'_> {
    fn resolved<'b>(&'b self, name: &PkgName) -> Vec<(&'b NodeAttrs, Option<&'b Digest>)> {
        let mut found = self.state.resolved(name);
        if self.node.name() == name {
            found.push((&self.node.attrs, self.node.source.installed_hash()));
        }
        found
    }
}
