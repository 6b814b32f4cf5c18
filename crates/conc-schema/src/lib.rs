// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! The data model of conc: abstract and concrete specs, the
//! constraints they carry, package definitions and lockfiles.

mod abstract_spec;
mod build_system;
mod concrete;
mod constraints;
mod definition;
mod edge;
mod error;
pub mod hash;
mod lockfile;
mod parsing;
mod request;

pub use abstract_spec::{AbstractSpec, ResolvedNodes};
pub use build_system::{BUILD_SYSTEM_VARIANT, BuildSystem, BuildSystemT, ImplicitDependency};
pub use concrete::{ConcreteEdge, ConcreteNode, ConcreteSpec, ConcreteSpecBuilder, NodeAttrs};
pub use conc_schema_foundation as foundation;
pub use conc_schema_foundation::{FromYaml, SerdeYamlError};
pub use constraints::Constraints;
pub use definition::{
    ConflictDecl,
    DependencyDecl,
    PackageDefinition,
    ProvidesDecl,
    VariantDecl,
    VariantDomain,
    VersionDecl,
};
pub use edge::{EdgeType, EdgeTypes, default_edge_types, format_edge_types};
pub use error::{
    ConflictError,
    Error,
    HashMismatchError,
    InvalidPackageError,
    ParseError,
    Result,
};
pub use lockfile::{LOCKFILE_VERSION, LockedNode, Lockfile};
pub use parsing::parse_spec;
pub use request::{InclusionPolicy, NodeKey, PkgRequest, RequestedBy};
