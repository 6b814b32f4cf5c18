// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Version(#[from] crate::version::Error),
    #[error("Invalid version range: {0}")]
    #[diagnostic(code(conc::invalid_version_range))]
    InvalidRange(String),
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::InvalidRange(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::InvalidRange(err.to_owned())
    }
}
