// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_schema::ConflictError;
use miette::Diagnostic;
use thiserror::Error;

use super::graph::GraphError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Graph(#[from] GraphError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    PackageIterator(#[from] conc_solve_package_iterator::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Solution(#[from] conc_solve_solution::Error),
    #[error("Error: {0}")]
    String(String),
}

pub type GetCurrentResolveResult<T> = std::result::Result<T, GetCurrentResolveError>;

#[derive(Debug, Error)]
pub enum GetCurrentResolveError {
    #[error("Package not resolved: {0}")]
    PackageNotResolved(String),
}

pub type GetMergedRequestResult<T> = std::result::Result<T, GetMergedRequestError>;

#[derive(Diagnostic, Debug, Error)]
pub enum GetMergedRequestError {
    #[error("No request for: {0}")]
    NoRequestFor(String),
    /// The requests made so far for one node cannot all hold
    #[error("Conflicting requests for {key}")]
    Conflict {
        key: String,
        #[source]
        #[diagnostic_source]
        source: ConflictError,
    },
}

impl GetMergedRequestError {
    /// The reason to give when a candidate is rejected because of this error
    pub fn reason(&self) -> String {
        match self {
            GetMergedRequestError::NoRequestFor(key) => format!("nothing requested {key}"),
            GetMergedRequestError::Conflict { source, .. } => source.to_string(),
        }
    }
}

impl From<GetMergedRequestError> for Error {
    fn from(err: GetMergedRequestError) -> Self {
        Error::Graph(GraphError::RequestError(err))
    }
}
