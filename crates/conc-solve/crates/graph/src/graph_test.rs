// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use conc_schema::foundation::arch::Arch;
use conc_schema::foundation::format::{FormatChange, FormatChangeOptions};
use conc_schema::foundation::name::PkgNameBuf;
use conc_schema::foundation::pkg_name;
use conc_schema::foundation::variant::VariantMap;
use conc_schema::{
    AbstractSpec,
    EdgeType,
    InclusionPolicy,
    NodeAttrs,
    NodeKey,
    PkgRequest,
    RequestedBy,
};
use conc_solve_package_iterator::{CandidateIterator, ProviderIterator};
use conc_solve_solution::{PackageSource, SolvedEdge, SolvedNode};
use rstest::rstest;

use super::{
    BRANCH_ALREADY_ATTEMPTED,
    Change,
    DEAD_STATE,
    Decision,
    Graph,
    GraphError,
    Node,
    RequestPackage,
    State,
    StepBack,
};
use crate::GetMergedRequestError;

fn key(name: &str) -> NodeKey {
    NodeKey::new(name.parse().unwrap())
}

fn request(text: &str) -> PkgRequest {
    let spec: AbstractSpec = text.parse().unwrap();
    PkgRequest::from_spec(&spec, RequestedBy::CommandLine).remove(0)
}

fn attrs(name: &str, version: &str) -> NodeAttrs {
    NodeAttrs {
        name: name.parse().unwrap(),
        version: version.parse().unwrap(),
        compiler: "gcc@12.2.0".parse().unwrap(),
        arch: Arch::new("linux", "ubuntu22.04", "x86_64"),
        variants: VariantMap::default(),
    }
}

fn node(key: NodeKey, version: &str, dependencies: Vec<SolvedEdge>) -> Arc<SolvedNode> {
    let name = key.name.to_string();
    Arc::new(SolvedNode {
        attrs: attrs(&name, version),
        definition: Arc::new(
            serde_json::from_value(serde_json::json!({"name": name, "versions": [version]}))
                .unwrap(),
        ),
        key,
        dependencies,
        source: PackageSource::Build,
    })
}

fn link() -> BTreeSet<EdgeType> {
    BTreeSet::from([EdgeType::Build, EdgeType::Link])
}

fn request_keys(state: &State) -> Vec<String> {
    state
        .get_pkg_requests()
        .iter()
        .map(|r| r.key.to_string())
        .collect()
}

#[rstest]
fn test_request_merges_into_existing() {
    let state = State::new(vec![request("pkg@1.0:")], vec![]);
    let change = RequestPackage::new(request("pkg@:2.0"));
    let state = change.apply(&state, &state);

    assert_eq!(state.get_pkg_requests().len(), 1);
    let merged = state.get_merged_request(&key("pkg")).unwrap();
    assert!(merged.is_satisfied_by(&attrs("pkg", "1.5"), None).is_ok());
    assert!(!merged.is_satisfied_by(&attrs("pkg", "3.0"), None).is_ok());
    assert!(!merged.is_satisfied_by(&attrs("pkg", "0.9"), None).is_ok());
}

#[rstest]
fn test_conflicting_request_is_kept_and_reported() {
    let state = State::new(vec![request("pkg@1.0")], vec![]);
    let change = RequestPackage::new(request("pkg@2.0"));
    let state = change.apply(&state, &state);

    assert_eq!(state.get_pkg_requests().len(), 2);
    match state.get_merged_request(&key("pkg")) {
        Err(GetMergedRequestError::Conflict { key, .. }) => assert_eq!(key, "pkg"),
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert!(state.get_next_request().is_err());
}

#[rstest]
fn test_requests_for_the_same_package_move_to_front() {
    let state = State::new(vec![request("a"), request("b"), request("c")], vec![]);
    let split = PkgRequest::new(
        NodeKey::split("b".parse().unwrap(), pkg_name!("x")),
        Default::default(),
        RequestedBy::CommandLine,
    );
    let state = RequestPackage::new(split).apply(&state, &state);
    assert_eq!(request_keys(&state), ["b", "a", "c", "b[for x]"]);
}

#[rstest]
fn test_next_request_skips_what_is_settled() {
    let optional = request("zlib").with_inclusion(InclusionPolicy::IfAlreadyPresent);
    let state = State::new(
        vec![optional, request("app"), request("mpi"), request("cmake")],
        vec![node(key("app"), "1.0", vec![])],
    );
    let next = state.get_next_request().unwrap().unwrap();
    assert_eq!(next.key, key("mpi"));

    let provide = Change::SetProvider(super::SetProvider::new(
        "mpi".parse().unwrap(),
        "openmpi".parse().unwrap(),
    ));
    let state = provide.apply(&state, &state);
    let next = state.get_next_request().unwrap().unwrap();
    assert_eq!(next.key, key("cmake"), "a virtual with a provider is settled");
    assert_eq!(state.get_provider(pkg_name!("mpi")), Some(pkg_name!("openmpi")));
}

#[rstest]
fn test_split_node_merges_optional_package_requests() {
    let optional = request("zlib@1.3").with_inclusion(InclusionPolicy::IfAlreadyPresent);
    let split_key = NodeKey::split("zlib".parse().unwrap(), pkg_name!("app"));
    let split = PkgRequest::new(split_key.clone(), Default::default(), RequestedBy::CommandLine);
    let state = State::new(vec![optional, split], vec![]);

    let merged = state.get_merged_request(&split_key).unwrap();
    assert_eq!(merged.key, split_key);
    assert_eq!(merged.inclusion_policy, InclusionPolicy::Always);
    assert!(!merged.is_satisfied_by(&attrs("zlib", "1.2.13"), None).is_ok());
    assert!(merged.is_satisfied_by(&attrs("zlib", "1.3"), None).is_ok());
}

#[rstest]
fn test_unmet_dependency_requests() {
    let unmet = request("zlib").with_inclusion(InclusionPolicy::IfAlreadyPresent);
    let met = request("cmake").with_inclusion(InclusionPolicy::IfAlreadyPresent);
    let mut from_package = request("bzip2").with_inclusion(InclusionPolicy::IfAlreadyPresent);
    from_package.requested_by.clear();
    from_package.add_requester(RequestedBy::Package(key("app")));
    let state = State::new(
        vec![unmet, met, from_package],
        vec![node(key("cmake"), "3.27", vec![])],
    );
    let unmet: Vec<_> = state
        .unmet_dependency_requests()
        .into_iter()
        .map(|r| r.key.to_string())
        .collect();
    assert_eq!(unmet, ["zlib"]);
}

#[rstest]
fn test_state_id_ignores_solve_order() {
    let a = node(key("a"), "1.0", vec![]);
    let b = node(key("b"), "1.0", vec![]);
    let first = State::new(vec![], vec![Arc::clone(&a), Arc::clone(&b)]);
    let second = State::new(vec![], vec![b, a]);
    assert_eq!(first.id(), second.id());
    assert_ne!(first.id(), DEAD_STATE.id());
    assert_eq!(first.get_ordered_resolved_packages()[0].key, key("a"));
    assert_eq!(second.get_ordered_resolved_packages()[0].key, key("b"));
}

#[rstest]
fn test_dependency_path_follows_providers() {
    let state = State::new(
        vec![],
        vec![
            node(
                key("app"),
                "1.0",
                vec![SolvedEdge::virtual_dependency("mpi".parse().unwrap(), link())],
            ),
            node(key("openmpi"), "4.1", vec![SolvedEdge::new(key("hwloc"), link())]),
            node(key("hwloc"), "2.9", vec![]),
        ],
    );
    assert_eq!(state.dependency_path(&key("app"), &key("hwloc")), None, "no provider yet");

    let provide = Change::SetProvider(super::SetProvider::new(
        "mpi".parse().unwrap(),
        "openmpi".parse().unwrap(),
    ));
    let state = provide.apply(&state, &state);
    let path = state.dependency_path(&key("app"), &key("hwloc")).unwrap();
    assert_eq!(path, [key("app"), key("openmpi"), key("hwloc")]);
    assert_eq!(state.dependency_path(&key("hwloc"), &key("app")), None);
}

#[rstest]
fn test_resolve_package_skips_known_providers() {
    let base = State::new(vec![], vec![]);
    let provide = Change::SetProvider(super::SetProvider::new(
        "mpi".parse().unwrap(),
        "openmpi".parse().unwrap(),
    ));
    let base = provide.apply(&base, &base);

    let mpi: PkgNameBuf = "mpi".parse().unwrap();
    let blas: PkgNameBuf = "blas".parse().unwrap();
    let decision = Decision::builder(&base).resolve_package(
        &node(key("openmpi"), "4.1", vec![]),
        vec![request("hwloc")],
        vec![
            (mpi, "openmpi".parse().unwrap()),
            (blas, "openblas".parse().unwrap()),
        ],
    );
    let kinds: Vec<_> = decision
        .changes
        .iter()
        .map(|c| match c {
            Change::RequestPackage(_) => "request",
            Change::SetPackage(_) => "package",
            Change::SetProvider(_) => "provider",
            Change::StepBack(_) => "step back",
        })
        .collect();
    assert_eq!(kinds, ["package", "provider", "request"]);

    let state = decision.apply(&base);
    assert_eq!(state.get_providers().len(), 2);
    assert!(state.get_current_resolve(&key("openmpi")).is_ok());
    assert!(state.get_current_resolve(&key("hwloc")).is_err());
    assert_eq!(state.state_depth, base.state_depth + 1);
}

#[rstest]
#[tokio::test]
async fn test_repeated_branch_is_rejected() {
    let mut graph = Graph::new();
    let root_id = DEAD_STATE.id();
    let decision = Arc::new(Decision::new(vec![Change::RequestPackage(
        RequestPackage::new(request("pkg")),
    )]));

    let node = graph.add_branch(root_id, Arc::clone(&decision)).await.unwrap();
    assert_eq!(node.read().await.input_count(), 1);
    assert_eq!(graph.len(), 2);

    match graph.add_branch(root_id, decision).await {
        Err(GraphError::RecursionError(msg)) => assert_eq!(msg, BRANCH_ALREADY_ATTEMPTED),
        other => panic!("expected a recursion error, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_step_back_is_not_recorded() {
    let mut graph = Graph::new();
    let root_id = DEAD_STATE.id();
    let decision = Arc::new(
        Change::RequestPackage(RequestPackage::new(request("pkg"))).as_decision(),
    );
    let forward = graph.add_branch(root_id, decision).await.unwrap();
    let forward_id = forward.read().await.id();

    let counter = Arc::new(AtomicU64::new(0));
    let back = Arc::new(
        Change::StepBack(StepBack::new("pkg: out of options", &DEAD_STATE, counter.clone()))
            .as_decision(),
    );
    for _ in 0..2 {
        let node = graph.add_branch(forward_id, Arc::clone(&back)).await.unwrap();
        assert_eq!(node.read().await.id(), root_id);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(forward.read().await.outputs().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_iterators_are_copied_into_new_nodes() {
    let iter: Box<dyn CandidateIterator> = Box::new(ProviderIterator::new(
        "mpi".parse().unwrap(),
        ["mpich", "openmpi"].iter().map(|n| n.parse().unwrap()).collect(),
        &BTreeSet::new(),
        &[],
    ));
    let iter = Arc::new(tokio::sync::Mutex::new(iter));
    let mut parent = Node::new(State::default());
    parent.set_iterator(key("mpi"), &iter).await;

    let first = iter.lock().await.next().await.unwrap();
    assert!(first.is_some());

    let mut child = Node::new(State::default());
    let shared = parent.get_iterator(&key("mpi")).unwrap();
    child.set_iterator(key("mpi"), &shared).await;

    let mut remaining = HashMap::new();
    for (name, node) in [("parent", &parent), ("child", &child)] {
        let iter = node.get_iterator(&key("mpi")).unwrap();
        let mut count = 0;
        while iter.lock().await.next().await.unwrap().is_some() {
            count += 1;
        }
        remaining.insert(name, count);
    }
    assert_eq!(remaining["parent"], 2, "copies do not share a position");
    assert_eq!(remaining["child"], 2);
}

#[rstest]
fn test_format_change() {
    let state = State::new(vec![request("pkg")], vec![]);
    let options = FormatChangeOptions {
        verbosity: 1,
        level: 1,
    };
    let resolve = Change::SetPackage(Box::new(super::SetPackage::new(node(
        key("pkg"),
        "1.0",
        vec![],
    ))));
    let text = resolve.format_change(&options, Some(&state));
    assert!(text.contains("RESOLVE"), "{text}");
    assert!(text.contains("requested by command line"), "{text}");

    let blocked = Change::StepBack(StepBack::new(
        "no candidates",
        &state,
        Arc::new(AtomicU64::new(0)),
    ));
    let text = blocked.format_change(&options, None);
    assert!(text.contains("BLOCKED"), "{text}");
    assert!(text.contains("no candidates"), "{text}");
}
