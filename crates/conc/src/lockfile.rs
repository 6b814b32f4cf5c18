// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use conc_schema::ConcreteSpec;

use crate::{Error, Result};

#[cfg(test)]
#[path = "./lockfile_test.rs"]
mod lockfile_test;

/// Load a concrete graph from a lockfile, verifying every hash.
///
/// Files ending in `.json` are read as json, anything else as yaml.
pub fn read_lockfile<P: AsRef<Path>>(path: P) -> Result<ConcreteSpec> {
    let path = path.as_ref();
    let spec = ConcreteSpec::load(path)?;
    tracing::debug!(path = %path.display(), nodes = spec.len(), "read lockfile");
    Ok(spec)
}

/// Write a concrete graph as a lockfile, choosing the format by
/// the file extension the same way [`read_lockfile`] does.
pub fn write_lockfile<P: AsRef<Path>>(spec: &ConcreteSpec, path: P) -> Result<()> {
    let path = path.as_ref();
    let text = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => spec.to_json()?,
        _ => spec.to_yaml()?,
    };
    std::fs::write(path, text).map_err(|err| Error::FileWriteError(path.to_owned(), err))?;
    tracing::debug!(path = %path.display(), nodes = spec.len(), "wrote lockfile");
    Ok(())
}
