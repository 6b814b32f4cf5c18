// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::foundation::digest::Digest;
use crate::{
    ConcreteEdge,
    ConcreteNode,
    ConcreteSpec,
    Error,
    HashMismatchError,
    NodeAttrs,
    Result,
};

#[cfg(test)]
#[path = "./lockfile_test.rs"]
mod lockfile_test;

/// The only lockfile layout understood by this version
pub const LOCKFILE_VERSION: u32 = 1;

/// One node as written to a lockfile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedNode {
    #[serde(flatten)]
    pub attrs: NodeAttrs,
    pub hash: Digest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ConcreteEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<PathBuf>,
}

/// The serialized form of a [`ConcreteSpec`].
///
/// Nodes are listed dependencies first and every recorded hash is
/// checked against the content when read back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    pub roots: Vec<Digest>,
    pub nodes: Vec<LockedNode>,
}

impl From<&ConcreteSpec> for Lockfile {
    fn from(spec: &ConcreteSpec) -> Self {
        let nodes = spec
            .nodes()
            .map(|node| LockedNode {
                attrs: node.attrs().clone(),
                hash: *node.hash(),
                dependencies: node.dependencies().to_vec(),
                external: node.external_prefix().map(ToOwned::to_owned),
            })
            .collect();
        Self {
            version: LOCKFILE_VERSION,
            roots: spec.roots().to_vec(),
            nodes,
        }
    }
}

impl Lockfile {
    /// Rebuild the concrete graph, recomputing every hash.
    pub fn into_spec(self) -> Result<ConcreteSpec> {
        if self.version != LOCKFILE_VERSION {
            return Err(Error::InvalidLockfile(format!(
                "unsupported lockfile version {}, expected {LOCKFILE_VERSION}",
                self.version
            )));
        }
        let mut builder = ConcreteSpec::builder();
        for locked in self.nodes {
            for edge in locked.dependencies.iter() {
                if !builder.contains(&edge.hash) {
                    return Err(Error::InvalidLockfile(format!(
                        "{} is listed before its dependency {} /{}",
                        locked.attrs.name,
                        edge.name,
                        edge.hash.short()
                    )));
                }
            }
            let mut node = ConcreteNode::new(locked.attrs, locked.dependencies)?;
            if *node.hash() != locked.hash {
                return Err(HashMismatchError {
                    name: node.name().to_owned(),
                    recorded: locked.hash,
                    computed: *node.hash(),
                }
                .into());
            }
            if let Some(prefix) = locked.external {
                node = node.with_external_prefix(prefix);
            }
            builder.insert(node)?;
        }
        if self.roots.is_empty() {
            return Err(Error::InvalidLockfile("no roots are listed".into()));
        }
        for root in self.roots {
            if !builder.contains(&root) {
                return Err(Error::InvalidLockfile(format!(
                    "root /{} is not among the listed nodes",
                    root.short()
                )));
            }
            builder.add_root(root)?;
        }
        Ok(builder.build())
    }
}

impl ConcreteSpec {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&Lockfile::from(self)).map_err(Error::SpecEncodingError)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&Lockfile::from(self)).map_err(Error::SpecJsonError)
    }

    /// Read a graph written by [`Self::to_yaml`]
    pub fn from_yaml(text: &str) -> Result<Self> {
        let lockfile: Lockfile = serde_yaml::from_str(text)
            .map_err(|err| Error::InvalidLockfile(err.to_string()))?;
        lockfile.into_spec()
    }

    /// Read a graph written by [`Self::to_json`]
    pub fn from_json(text: &str) -> Result<Self> {
        let lockfile: Lockfile = serde_json::from_str(text)
            .map_err(|err| Error::InvalidLockfile(err.to_string()))?;
        lockfile.into_spec()
    }

    /// Read a lockfile from disk, choosing the format by extension.
    pub fn load<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|err| Error::FileReadError(path.clone(), err))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }
}
