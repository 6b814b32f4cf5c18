// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_schema::foundation::name::PkgNameBuf;
use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A definition file that could not be loaded.
#[derive(Debug)]
pub struct InvalidPackageDefinition(
    pub std::path::PathBuf,
    // the formatted serde error, which is neither clone-able nor
    // Send with its source attached
    pub String,
);

impl std::fmt::Display for InvalidPackageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid package definition {}: {}", self.0.display(), self.1)
    }
}

/// A name that neither a package definition nor any provider declares.
#[derive(Diagnostic, Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown package: {name}")]
#[diagnostic(
    code(conc::unknown_package),
    help("check the spelling, or add a definition for this package to the repository")
)]
pub struct UnknownPackageError {
    pub name: PkgNameBuf,
}

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    UnknownPackage(#[from] UnknownPackageError),
    #[error("{0}")]
    #[diagnostic(code(conc::invalid_package))]
    InvalidPackageDefinition(Box<InvalidPackageDefinition>),
    #[error("Package already published: {0}")]
    PackageExists(PkgNameBuf),
    #[error("{0} is declared both as a package and as a virtual provided by {1}")]
    AmbiguousVirtual(PkgNameBuf, PkgNameBuf),
    #[error("Failed to read file {0}")]
    FileReadError(std::path::PathBuf, #[source] std::io::Error),
    #[error("Repository directory does not exist: {0}")]
    DirectoryNotFound(std::path::PathBuf),
    #[error("invalid glob pattern")]
    PatternError(#[from] glob::PatternError),
    #[error("failed to process glob pattern")]
    GlobError(#[from] glob::GlobError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Schema(Box<conc_schema::Error>),
    #[error("{0}")]
    String(String),
}

impl Error {
    /// Return true if this is an `UnknownPackage` error.
    #[inline]
    pub fn is_unknown_package(&self) -> bool {
        matches!(self, Self::UnknownPackage(_))
    }
}

impl From<conc_schema::Error> for Error {
    fn from(err: conc_schema::Error) -> Error {
        Error::Schema(Box::new(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::String(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::String(err.to_owned())
    }
}
