// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

mod error;
mod solution;

pub use error::{CycleDetectedError, Error, Result, UnificationError};
pub use solution::{PackageSource, Solution, SolvedEdge, SolvedNode};
