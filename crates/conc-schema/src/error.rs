// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::foundation::digest::Digest;
use crate::foundation::name::PkgNameBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Parse(#[from] ParseError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    InvalidPackage(#[from] InvalidPackageError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    HashMismatch(#[from] HashMismatchError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Name(#[from] crate::foundation::name::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Version(#[from] crate::foundation::version::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    VersionRange(#[from] crate::foundation::version_range::Error),
    #[error("Invalid lockfile: {0}")]
    #[diagnostic(code(conc::invalid_lockfile))]
    InvalidLockfile(String),
    #[error("Failed to encode spec: {0}")]
    SpecEncodingError(#[source] serde_yaml::Error),
    #[error("Failed to encode spec as json: {0}")]
    SpecJsonError(#[source] serde_json::Error),
    #[error("Failed to read {0}")]
    FileReadError(std::path::PathBuf, #[source] std::io::Error),
    #[error("Error: {0}")]
    String(String),
}

/// Malformed spec text.
#[derive(Diagnostic, Debug, Error)]
#[error("Invalid spec '{text}': {message} (at position {position})")]
#[diagnostic(code(conc::parse_error))]
pub struct ParseError {
    pub message: String,
    pub position: usize,
    #[source_code]
    pub text: String,
    #[label("here")]
    pub span: SourceSpan,
}

impl ParseError {
    pub fn new<M: Into<String>>(text: &str, position: usize, message: M) -> Self {
        let position = position.min(text.len());
        Self {
            message: message.into(),
            position,
            text: text.to_owned(),
            span: SourceSpan::from((position, 0)),
        }
    }
}

/// Two constraints that can never hold together.
#[derive(Diagnostic, Debug, Error)]
#[error("Conflicting constraints: '{first}' and '{second}'{}", describe(.reason))]
#[diagnostic(code(conc::conflict))]
pub struct ConflictError {
    pub first: String,
    pub second: String,
    pub reason: Option<String>,
}

fn describe(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

impl ConflictError {
    pub fn new<A: ToString, B: ToString>(first: A, second: B) -> Self {
        Self {
            first: first.to_string(),
            second: second.to_string(),
            reason: None,
        }
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A package definition that cannot be used.
#[derive(Diagnostic, Debug, Error)]
#[error("Invalid package definition for {name}: {message}")]
#[diagnostic(code(conc::invalid_package))]
pub struct InvalidPackageError {
    pub name: String,
    pub message: String,
}

impl InvalidPackageError {
    pub fn new<N: ToString, M: Into<String>>(name: N, message: M) -> Self {
        Self {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// A stored hash disagrees with the hash computed from the content.
#[derive(Diagnostic, Debug, Error)]
#[error("Hash mismatch for {name}: recorded {recorded}, computed {computed}")]
#[diagnostic(
    code(conc::hash_mismatch),
    help("the serialized spec was modified after it was written")
)]
pub struct HashMismatchError {
    pub name: PkgNameBuf,
    pub recorded: Digest,
    pub computed: Digest,
}
