// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use conc_schema::foundation::name::PkgNameBuf;
use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Solve(#[from] conc_solve::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Schema(#[from] conc_schema::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Config(#[from] conc_config::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Storage(#[from] conc_storage::Error),
    #[error("Nothing to concretize")]
    #[diagnostic(code(conc::no_requests))]
    NoRequests,
    #[error("Concretization task failed: {0}")]
    TaskFailed(String),
    #[error("{0} has no known build system")]
    #[diagnostic(code(conc::unknown_build_system))]
    UnknownBuildSystem(PkgNameBuf),
    #[error("Failed to write {0}")]
    FileWriteError(PathBuf, #[source] std::io::Error),
}
