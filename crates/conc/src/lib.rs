// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! Resolve partially specified package requests into concrete,
//! hashed dependency graphs.
//!
//! ```no_run
//! # async fn example() -> conc::Result<()> {
//! let repo = conc::storage::DirRepository::open("/opt/packages")?;
//! let concretizer = conc::Concretizer::new(repo.snapshot());
//! let spec = concretizer.concretize_str("hdf5@1.14 +mpi ^openmpi").await?;
//! conc::write_lockfile(&spec, "conc.lock.yaml")?;
//! # Ok(())
//! # }
//! ```

mod concretize;
mod error;
pub mod fixtures;
mod lockfile;
mod plan;

pub use concretize::{Concretizer, concretize, concretize_each};
pub use error::{Error, Result};
pub use lockfile::{read_lockfile, write_lockfile};
pub use plan::{BuildStep, build_plan};
pub use {
    conc_config as config,
    conc_schema as schema,
    conc_solve as solve,
    conc_storage as storage,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
