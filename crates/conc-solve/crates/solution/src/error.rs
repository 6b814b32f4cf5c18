// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_schema::foundation::name::PkgNameBuf;
use conc_schema::{ConflictError, NodeKey};
use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Cycle(#[from] CycleDetectedError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Unification(#[from] UnificationError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    Schema(#[from] conc_schema::Error),
    #[error("Solution has no node for {0}")]
    MissingNode(NodeKey),
    #[error("No provider was chosen for virtual package {0}")]
    UnresolvedVirtual(PkgNameBuf),
    #[error("Error: {0}")]
    String(String),
}

/// A dependency path that leads back to where it started.
#[derive(Diagnostic, Debug, Error, Clone, PartialEq, Eq)]
#[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
#[diagnostic(
    code(conc::cycle_detected),
    help("a package cannot depend on itself, directly or through its dependencies")
)]
pub struct CycleDetectedError {
    /// Every node on the cycle, ending with the first one again
    pub cycle: Vec<String>,
}

/// One package name resolved to several configurations where only
/// one is allowed.
#[derive(Diagnostic, Debug, Error, Clone, PartialEq, Eq)]
#[error("{name} must resolve to a single configuration, found: {}", .nodes.join(", "))]
#[diagnostic(
    code(conc::unification),
    help("mark the package as unification exempt if separate builds are intended")
)]
pub struct UnificationError {
    pub name: PkgNameBuf,
    pub nodes: Vec<String>,
}
