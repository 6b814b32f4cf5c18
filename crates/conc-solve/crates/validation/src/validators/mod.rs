// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

mod conflicts;
mod definition;
mod dependencies;
mod pkg_request;
mod prelude;
mod provides;

pub use conflicts::ConflictsValidator;
pub use definition::DefinitionValidator;
pub use dependencies::DependenciesValidator;
pub use pkg_request::PkgRequestValidator;
pub use provides::ProvidesValidator;
