// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

/// The result of checking a value against a constraint.
///
/// Incompatible results always carry a human readable reason
/// so that solver failures can be explained.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[must_use = "this `Compatibility` may be an `Incompatible` variant, which should be handled"]
pub enum Compatibility {
    Compatible,
    Incompatible(String),
}

impl std::fmt::Display for Compatibility {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Compatibility::Compatible => f.write_str(""),
            Compatibility::Incompatible(msg) => f.write_str(msg),
        }
    }
}

impl std::ops::Not for &'_ Compatibility {
    type Output = bool;

    fn not(self) -> Self::Output {
        match self {
            Compatibility::Compatible => false,
            Compatibility::Incompatible(_) => true,
        }
    }
}

impl Compatibility {
    pub fn incompatible(msg: impl Into<String>) -> Self {
        Compatibility::Incompatible(msg.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, &Compatibility::Compatible)
    }

    pub fn message(&self) -> &str {
        match self {
            Compatibility::Compatible => "",
            Compatibility::Incompatible(msg) => msg.as_ref(),
        }
    }

    /// Continue with another check only if this one passed.
    pub fn and_then<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Compatibility::Compatible => f(),
            incompatible => incompatible,
        }
    }
}
