// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_schema::foundation::version::Compatibility;
use conc_schema::{PackageDefinition, PkgRequest};
use conc_solve_graph::State;
use conc_solve_solution::SolvedNode;
use enum_dispatch::enum_dispatch;

pub use crate::validators::{
    ConflictsValidator,
    DefinitionValidator,
    DependenciesValidator,
    PkgRequestValidator,
    ProvidesValidator,
};

#[cfg(test)]
#[path = "./validation_test.rs"]
mod validation_test;

#[derive(Clone, Copy, Debug)]
#[enum_dispatch(ValidatorT)]
pub enum Validators {
    Conflicts(ConflictsValidator),
    Definition(DefinitionValidator),
    Dependencies(DependenciesValidator),
    PackageRequest(PkgRequestValidator),
    Provides(ProvidesValidator),
}

/// For validating a candidate node against the current state
#[enum_dispatch]
pub trait ValidatorT {
    /// Check if the given node is appropriate for the provided state.
    ///
    /// `requests` are the requests that the node would make of its
    /// own dependencies if it were accepted.
    fn validate_node(
        &self,
        state: &State,
        node: &SolvedNode,
        requests: &[PkgRequest],
    ) -> crate::Result<Compatibility>;
}

/// Every validator, in the order they are run by the solver.
///
/// The cheaper checks come first so that most candidates are
/// rejected before the graph-wide ones run.
pub const fn default_validators() -> &'static [Validators] {
    &[
        Validators::Definition(DefinitionValidator {}),
        Validators::PackageRequest(PkgRequestValidator {}),
        Validators::Provides(ProvidesValidator {}),
        Validators::Dependencies(DependenciesValidator {}),
        Validators::Conflicts(ConflictsValidator {}),
    ]
}

/// Check that a package could satisfy the merged request for a virtual.
///
/// Conditions on the provision are checked later, against the
/// configured provider node.
pub fn validate_provider(
    virtual_request: &PkgRequest,
    definition: &PackageDefinition,
) -> Compatibility {
    let virtual_name = virtual_request.name();
    let versions = &virtual_request.constraints.versions;
    if definition.provides_for(virtual_name, versions).next().is_some() {
        return Compatibility::Compatible;
    }
    if definition.provided_virtuals().contains(virtual_name) {
        Compatibility::incompatible(format!(
            "{} does not provide {virtual_name}@{versions}",
            definition.name()
        ))
    } else {
        Compatibility::incompatible(format!(
            "{} does not provide {virtual_name}",
            definition.name()
        ))
    }
}
