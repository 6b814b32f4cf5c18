// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Graph(#[from] conc_solve_graph::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    GetMergedRequest(#[from] conc_solve_graph::GetMergedRequestError),
    #[error("Validation error: {0}")]
    String(String),
}
