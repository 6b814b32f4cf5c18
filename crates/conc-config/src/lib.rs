// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

mod config;
mod error;

pub use error::{Error, Result};

pub use self::config::*;
