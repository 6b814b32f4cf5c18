// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

//! Helpers for writing solver tests against in-memory package universes.

pub use conc_schema::PackageDefinition;
pub use conc_storage::{MemRepository, PublishPolicy};
pub use {serde_json, tracing};

/// Creates an in-memory repository holding the given definitions.
///
/// Each entry is either a json definition or an identifier bound to
/// an existing [`PackageDefinition`].
///
/// make_repo!([{"name": "zlib", "versions": ["1.3", "1.2.13"]}]);
/// make_repo!([zlib_def, {"name": "libpng", "versions": ["1.6.40"], "dependencies": ["zlib"]}]);
#[macro_export]
macro_rules! make_repo {
    ( [ $( $spec:tt ),* $(,)? ] ) => {{
        $crate::tracing::debug!("creating in-memory repository");
        let repo = $crate::MemRepository::new();
        $(
            let definition = $crate::make_package!($spec);
            $crate::tracing::trace!(pkg = %definition.name(), "adding package to repo");
            repo.publish(definition, $crate::PublishPolicy::DoNotOverwriteExisting)
                .expect("duplicate package in test repository");
        )*
        repo
    }};
}

/// Make a package definition from json, or clone an existing one.
///
/// make_package!({"name": "cmake", "versions": ["3.27.7"]});
#[macro_export]
macro_rules! make_package {
    ($definition:ident) => {{ $crate::PackageDefinition::clone(&$definition) }};
    ($spec:tt) => {{
        let json = $crate::serde_json::json!($spec);
        let definition: $crate::PackageDefinition =
            $crate::serde_json::from_value(json).expect("Invalid package definition json");
        definition
    }};
}
