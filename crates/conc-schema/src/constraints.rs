// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use crate::foundation::arch::ArchSpec;
use crate::foundation::compiler::CompilerSpec;
use crate::foundation::digest::Digest;
use crate::foundation::variant::VariantRequests;
use crate::foundation::version::Compatibility;
use crate::foundation::version_range::VersionList;
use crate::{ConflictError, NodeAttrs};

#[cfg(test)]
#[path = "./constraints_test.rs"]
mod constraints_test;

/// The attribute constraints placed on a single spec node.
///
/// Unset attributes are unconstrained. The default value
/// admits any configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Constraints {
    pub versions: VersionList,
    pub compiler: Option<CompilerSpec>,
    pub variants: VariantRequests,
    pub arch: ArchSpec,
    /// Prefix of the hash of an installed configuration
    pub hash: Option<String>,
}

impl Constraints {
    /// True if these constraints admit any configuration
    pub fn is_empty(&self) -> bool {
        self.versions.is_any()
            && self.compiler.is_none()
            && self.variants.is_empty()
            && self.arch.is_empty()
            && self.hash.is_none()
    }

    /// Narrow these constraints with another set.
    ///
    /// On failure these constraints are left unchanged.
    pub fn constrain(&mut self, other: &Constraints) -> Result<(), ConflictError> {
        let versions = self.versions.intersection(&other.versions);
        if versions.is_empty() {
            return Err(ConflictError::new(
                format!("@{}", self.versions),
                format!("@{}", other.versions),
            )
            .with_reason("no version satisfies both"));
        }

        let compiler = match (&self.compiler, &other.compiler) {
            (Some(a), Some(b)) => Some(a.constrain(b).map_err(|reason| {
                ConflictError::new(format!("%{a}"), format!("%{b}")).with_reason(reason)
            })?),
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        let mut variants = self.variants.clone();
        variants.constrain(&other.variants).map_err(|reason| {
            ConflictError::new(self.variants.format_spec(), other.variants.format_spec())
                .with_reason(reason)
        })?;

        let arch = self.arch.constrain(&other.arch).map_err(|reason| {
            ConflictError::new(self.arch.format_spec(), other.arch.format_spec())
                .with_reason(reason)
        })?;

        let hash = match (&self.hash, &other.hash) {
            (Some(a), Some(b)) if a.starts_with(b.as_str()) => Some(a.clone()),
            (Some(a), Some(b)) if b.starts_with(a.as_str()) => Some(b.clone()),
            (Some(a), Some(b)) => {
                return Err(ConflictError::new(format!("/{a}"), format!("/{b}"))
                    .with_reason("hashes differ"));
            }
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        self.versions = versions;
        self.compiler = compiler;
        self.variants = variants;
        self.arch = arch;
        self.hash = hash;
        Ok(())
    }

    /// Check a node's resolved attributes against these constraints.
    ///
    /// Hash constraints can only be met by a node with a known hash.
    pub fn satisfied_by(&self, attrs: &NodeAttrs, hash: Option<&Digest>) -> Compatibility {
        if let Compatibility::Incompatible(reason) = self.versions.contains(&attrs.version) {
            return Compatibility::Incompatible(reason);
        }
        if let Some(compiler) = &self.compiler {
            if let Compatibility::Incompatible(reason) = compiler.satisfied_by(&attrs.compiler) {
                return Compatibility::Incompatible(reason);
            }
        }
        if let Compatibility::Incompatible(reason) = self.variants.satisfied_by(&attrs.variants) {
            return Compatibility::Incompatible(reason);
        }
        if let Compatibility::Incompatible(reason) = self.arch.satisfied_by(&attrs.arch) {
            return Compatibility::Incompatible(reason);
        }
        if let Some(prefix) = &self.hash {
            match hash {
                Some(digest) if digest.starts_with(prefix) => {}
                Some(digest) => {
                    return Compatibility::incompatible(format!(
                        "hash {} does not start with {prefix}",
                        digest.short()
                    ));
                }
                None => {
                    return Compatibility::incompatible(format!(
                        "/{prefix} requires an installed configuration"
                    ));
                }
            }
        }
        Compatibility::Compatible
    }

    /// Format these constraints as spec text, without a package name.
    pub fn format_spec(&self) -> String {
        let mut parts = Vec::new();
        if !self.versions.is_any() {
            parts.push(format!("@{}", self.versions));
        }
        if let Some(compiler) = &self.compiler {
            parts.push(format!("%{compiler}"));
        }
        if !self.variants.is_empty() {
            parts.push(self.variants.format_spec());
        }
        if !self.arch.is_empty() {
            parts.push(self.arch.format_spec());
        }
        if let Some(hash) = &self.hash {
            parts.push(format!("/{hash}"));
        }
        parts.join(" ")
    }
}

impl std::fmt::Display for Constraints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_spec())
    }
}
