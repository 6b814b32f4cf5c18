// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! The ordered candidates considered for each node of a resolution.

mod build_iterator;
mod error;
mod package_iterator;

pub use build_iterator::BuildIterator;
pub use error::{Error, Result};
pub use package_iterator::{
    Candidate,
    CandidateIterator,
    ExternalIterator,
    NodeCandidates,
    ProviderIterator,
    ReuseIterator,
    external_attrs,
};
