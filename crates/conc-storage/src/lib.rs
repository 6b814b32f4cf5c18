// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! Where package definitions and installed configurations come from.
//!
//! A resolution reads definitions through a [`ConstraintSource`],
//! normally an immutable [`RepositorySnapshot`] taken from one of the
//! repositories here, and installed configurations through an
//! [`InstalledIndex`].

mod dir;
mod error;
mod index;
mod mem;
mod snapshot;
mod source;

pub use dir::DirRepository;
pub use error::{Error, InvalidPackageDefinition, Result, UnknownPackageError};
pub use index::{InstalledIndex, InstalledSpec, MemIndex};
pub use mem::{MemRepository, PublishPolicy};
pub use snapshot::RepositorySnapshot;
pub use source::ConstraintSource;
