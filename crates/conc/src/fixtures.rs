// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! Helpers for tests of crates built on conc.

pub use conc_schema::foundation::fixtures::init_logging;
