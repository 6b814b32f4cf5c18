// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

mod error;
mod graph;

pub use error::{
    Error,
    GetCurrentResolveError,
    GetCurrentResolveResult,
    GetMergedRequestError,
    GetMergedRequestResult,
    Result,
};
pub use graph::{
    CachedHash,
    Change,
    DEAD_STATE,
    Decision,
    DecisionBuilder,
    Graph,
    GraphError,
    Node,
    Note,
    RequestPackage,
    SetPackage,
    SetProvider,
    SkipPackageNote,
    State,
    StepBack,
};
