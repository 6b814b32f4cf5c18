// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use format_serde_error::{ErrorTypes, SerdeError};

/// Carries a serde_yaml error into the renderer of format_serde_error,
/// which has no native support for serde_yaml 0.9.
pub struct SerdeYamlError(pub serde_yaml::Error);

impl From<SerdeYamlError> for ErrorTypes {
    fn from(SerdeYamlError(err): SerdeYamlError) -> Self {
        // format_serde_error columns are zero based
        let (line, column) = match err.location() {
            Some(at) => (Some(at.line()), Some(at.column().saturating_sub(1))),
            None => (None, None),
        };
        Self::Custom {
            error: Box::new(err),
            line,
            column,
        }
    }
}

/// Anything read from a yaml document, such as a package definition
/// file or a lockfile.
pub trait FromYaml: Sized {
    /// Parse the document, or describe where it went wrong with the
    /// offending line shown.
    fn from_yaml<S: Into<String>>(yaml: S) -> Result<Self, SerdeError>;
}

impl<T> FromYaml for T
where
    T: serde::de::DeserializeOwned,
{
    fn from_yaml<S: Into<String>>(yaml: S) -> Result<Self, SerdeError> {
        let document = yaml.into();
        match serde_yaml::from_str(&document) {
            Ok(value) => Ok(value),
            Err(err) => Err(SerdeError::new(document, SerdeYamlError(err))),
        }
    }
}
