// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! Checks applied to every candidate before it joins a resolution.

mod error;
mod validation;
pub mod validators;

pub use error::{Error, Result};
pub use validation::{ValidatorT, Validators, default_validators, validate_provider};
