// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

use crate::edge::EdgeTypes;
use crate::foundation::arch::Arch;
use crate::foundation::compiler::Compiler;
use crate::foundation::digest::{Digest, Hasher};
use crate::foundation::name::PkgName;
use crate::foundation::variant::VariantMap;
use crate::foundation::version::Version;
use crate::{ConcreteEdge, Error, NodeAttrs, Result};

#[cfg(test)]
#[path = "./hash_test.rs"]
mod hash_test;

/// Bumped whenever the canonical form changes, so that old
/// and new hashes can never collide.
const CANONICAL_FORMAT: u32 = 1;

#[derive(Serialize)]
struct CanonicalEdge<'a> {
    types: &'a EdgeTypes,
    name: &'a PkgName,
    hash: &'a Digest,
}

#[derive(Serialize)]
struct CanonicalNode<'a> {
    format: u32,
    name: &'a PkgName,
    version: &'a Version,
    compiler: &'a Compiler,
    arch: &'a Arch,
    variants: &'a VariantMap,
    dependencies: Vec<CanonicalEdge<'a>>,
}

/// Compute the hash of a concrete node from its attributes and
/// the already computed hashes of its dependencies.
///
/// Edges are ordered by type and then name so that the result does
/// not depend on the order in which dependencies were resolved.
/// Install locations never contribute.
pub fn node_hash(attrs: &NodeAttrs, dependencies: &[ConcreteEdge]) -> Result<Digest> {
    let mut edges: Vec<_> = dependencies
        .iter()
        .map(|edge| CanonicalEdge {
            types: &edge.types,
            name: &edge.name,
            hash: &edge.hash,
        })
        .collect();
    edges.sort_by(|a, b| (a.types, a.name).cmp(&(b.types, b.name)));

    let canonical = CanonicalNode {
        format: CANONICAL_FORMAT,
        name: &attrs.name,
        version: &attrs.version,
        compiler: &attrs.compiler,
        arch: &attrs.arch,
        variants: &attrs.variants,
        dependencies: edges,
    };
    let bytes = serde_json::to_vec(&canonical).map_err(Error::SpecJsonError)?;
    let mut hasher = Hasher::new();
    hasher.update(&bytes);
    Ok(hasher.finish())
}
