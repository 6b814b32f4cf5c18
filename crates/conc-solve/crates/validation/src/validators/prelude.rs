// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

pub use conc_schema::foundation::version::Compatibility;
pub use conc_schema::{NodeKey, PkgRequest};
pub use conc_solve_graph::{GetMergedRequestError, State};
pub use conc_solve_solution::SolvedNode;

pub use crate::ValidatorT;
