// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! The backtracking search that turns abstract specs into a
//! resolved dependency graph.

mod error;
mod solver;

pub use conc_schema::{AbstractSpec, ConcreteSpec, NodeKey, PkgRequest, RequestedBy};
pub use conc_solve_solution::{PackageSource, Solution};
pub use error::{Error, OutOfOptions, Result, UnsatisfiableConstraintError};
pub use solver::{Solver, SolverRuntime};
pub use {
    conc_solve_graph as graph,
    conc_solve_package_iterator as package_iterator,
    conc_solve_solution as solution,
    conc_solve_validation as validation,
};
