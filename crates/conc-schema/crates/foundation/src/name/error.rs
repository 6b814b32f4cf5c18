// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(code(conc::invalid_name))]
    InvalidNameError(#[from] InvalidNameError),
}

/// Denotes that an invalid package or variant name was given.
#[derive(Debug, Error)]
#[error("Invalid name: {message}")]
pub struct InvalidNameError {
    pub message: String,
}

impl InvalidNameError {
    pub fn new_error(msg: String) -> Error {
        Error::InvalidNameError(Self { message: msg })
    }
}
