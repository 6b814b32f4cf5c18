// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Storage(#[from] conc_storage::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Schema(#[from] conc_schema::Error),
    #[error("Error: {0}")]
    String(String),
}
