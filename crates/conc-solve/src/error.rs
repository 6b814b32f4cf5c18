// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use colored::Colorize;
use conc_schema::PkgRequest;
use conc_schema::foundation::format::FormatError;
use conc_solve_graph::Note;
use conc_solve_solution::CycleDetectedError;
use conc_storage::UnknownPackageError;
use miette::Diagnostic;
use thiserror::Error;

#[cfg(test)]
#[path = "./error_test.rs"]
mod error_test;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    OutOfOptions(#[from] OutOfOptions),
    /// A package named by some request does not exist
    #[error("Package '{}' not found during the solve", .0.key)]
    PackageNotFoundDuringSolve(Box<PkgRequest>),
    /// The current state cannot lead to a solution
    #[error("{0}")]
    DeadEnd(String),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    UnknownPackage(#[from] UnknownPackageError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Unsatisfiable(#[from] UnsatisfiableConstraintError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Cycle(#[from] CycleDetectedError),
    #[error("Solver interrupted: {0}")]
    #[diagnostic(code(conc::solver_interrupted))]
    SolverInterrupted(String),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Graph(#[from] conc_solve_graph::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    GraphGraph(#[from] conc_solve_graph::GraphError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    PackageIterator(#[from] conc_solve_package_iterator::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Solution(#[from] conc_solve_solution::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Validation(#[from] conc_solve_validation::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Schema(#[from] conc_schema::Error),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Storage(#[from] conc_storage::Error),
    #[error("Error: {0}")]
    String(String),
}

/// Every candidate for a request was rejected.
#[derive(Diagnostic, Debug, Error)]
#[error("Out of options for {}", .request.key)]
#[diagnostic(code(conc::out_of_options))]
pub struct OutOfOptions {
    pub request: PkgRequest,
    pub notes: Vec<Note>,
}

/// The search ran out of choices to revisit.
#[derive(Diagnostic, Debug, Error, Clone, PartialEq, Eq)]
#[error("Cannot satisfy {request}:\n * {}", .chain.join("\n * "))]
#[diagnostic(
    code(conc::unsatisfiable),
    help("relax the constraints that appear in the chain above")
)]
pub struct UnsatisfiableConstraintError {
    /// The specs that were being concretized
    pub request: String,
    /// The contradictions met, the last one first
    pub chain: Vec<String>,
}

impl FormatError for Error {
    fn format_error(&self, verbosity: u32) -> String {
        let mut msg = String::new();
        msg.push_str("Failed to resolve");
        match self {
            Error::OutOfOptions(_) => {
                msg.push_str("\n * out of options");
            }
            Error::SolverInterrupted(err) => {
                msg.push_str("\n * ");
                msg.push_str(err.as_str());
            }
            Error::Unsatisfiable(err) => {
                msg.push_str(&format!("\n * cannot satisfy {}", err.request));
                let shown = match verbosity {
                    0 => 1,
                    1 => 5,
                    _ => err.chain.len(),
                };
                for link in err.chain.iter().take(shown) {
                    msg.push_str("\n   ");
                    msg.push_str(link);
                }
            }
            err => {
                msg.push_str("\n * ");
                msg.push_str(err.to_string().as_str());
            }
        }
        match verbosity {
            0 => {
                msg.push_str(&"\n * try '--verbose/-v' for more info".dimmed().yellow());
            }
            1 => {
                msg.push_str(&"\n * try '-vv' for even more info".dimmed().yellow());
            }
            2 => {
                msg.push_str(&"\n * try '-vvv' for even more info".dimmed().yellow());
            }
            3.. => (),
        }
        msg
    }
}
