// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use conc_schema::foundation::arch::Arch;
use conc_schema::foundation::digest::Digest;
use conc_schema::foundation::variant::VariantMap;
use conc_schema::{
    AbstractSpec,
    ConcreteSpec,
    EdgeType,
    NodeAttrs,
    NodeKey,
    PackageDefinition,
    PkgRequest,
    RequestedBy,
};
use conc_solve_graph::{Change, SetProvider, State};
use conc_solve_solution::{PackageSource, SolvedEdge, SolvedNode};
use rstest::rstest;

use super::{
    ConflictsValidator,
    DefinitionValidator,
    DependenciesValidator,
    PkgRequestValidator,
    ProvidesValidator,
    ValidatorT,
    default_validators,
    validate_provider,
};

fn def(value: serde_json::Value) -> Arc<PackageDefinition> {
    Arc::new(serde_json::from_value(value).unwrap())
}

fn plain(name: &str, versions: &[&str]) -> Arc<PackageDefinition> {
    def(serde_json::json!({"name": name, "versions": versions}))
}

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

fn node(definition: Arc<PackageDefinition>, version: &str) -> SolvedNode {
    let name = definition.name().to_string();
    SolvedNode {
        key: key(&name),
        attrs: NodeAttrs {
            variants: definition.default_variants(),
            ..attrs(&name, version)
        },
        dependencies: Vec::new(),
        source: PackageSource::Build,
        definition,
    }
}

fn with_provider(state: Arc<State>, virtual_name: &str, provider: &str) -> Arc<State> {
    let change = Change::SetProvider(SetProvider::new(
        virtual_name.parse().unwrap(),
        provider.parse().unwrap(),
    ));
    change.apply(&state, &state)
}

fn mpi_provider(provides: &str) -> Arc<PackageDefinition> {
    def(serde_json::json!({
        "name": "openmpi",
        "versions": ["4.1.5"],
        "provides": [provides],
    }))
}

#[rstest]
fn test_definition_validator() {
    let zlib = plain("zlib", &["1.3", "1.2.13"]);
    let state = State::default();

    let compat = DefinitionValidator {}
        .validate_node(&state, &node(Arc::clone(&zlib), "1.3"), &[])
        .unwrap();
    assert!(compat.is_ok(), "{compat}");

    let compat = DefinitionValidator {}
        .validate_node(&state, &node(Arc::clone(&zlib), "1.4"), &[])
        .unwrap();
    assert!(compat.message().contains("no declared version 1.4"), "{compat}");

    let mut installed = node(zlib, "1.1");
    installed.source = PackageSource::Installed {
        spec: Arc::new(ConcreteSpec::default()),
        hash: Digest::of(b"zlib-1.1"),
    };
    let compat = DefinitionValidator {}
        .validate_node(&state, &installed, &[])
        .unwrap();
    assert!(compat.is_ok(), "installations are not checked against the definition");
}

#[rstest]
fn test_pkg_request_validator() {
    let zlib = plain("zlib", &["1.3", "1.2.13"]);
    let state = State::new(vec![request("zlib@1.2")], vec![]);

    let compat = PkgRequestValidator {}
        .validate_node(&state, &node(Arc::clone(&zlib), "1.3"), &[])
        .unwrap();
    assert!(!compat.is_ok());
    let compat = PkgRequestValidator {}
        .validate_node(&state, &node(Arc::clone(&zlib), "1.2.13"), &[])
        .unwrap();
    assert!(compat.is_ok(), "{compat}");

    let compat = PkgRequestValidator {}
        .validate_node(&State::default(), &node(zlib, "1.3"), &[])
        .unwrap();
    assert!(compat.message().contains("was not requested"), "{compat}");
}

#[rstest]
#[case::in_range("mpi@3", true)]
#[case::out_of_range("mpi@:2", false)]
fn test_provides_validator(#[case] provides: &str, #[case] expected: bool) {
    let state = State::new(vec![request("mpi@3:")], vec![]);
    let state = with_provider(state, "mpi", "openmpi");
    let compat = ProvidesValidator {}
        .validate_node(&state, &node(mpi_provider(provides), "4.1.5"), &[])
        .unwrap();
    assert_eq!(compat.is_ok(), expected, "{compat}");
}

#[rstest]
fn test_dependencies_against_resolved_nodes() {
    let zlib = Arc::new(node(plain("zlib", &["1.2.13"]), "1.2.13"));
    let state = State::new(vec![request("app")], vec![]);
    let state = Change::SetPackage(Box::new(conc_solve_graph::SetPackage::new(zlib)))
        .apply(&state, &state);
    let app = node(plain("app", &["1.0"]), "1.0");

    let compat = DependenciesValidator {}
        .validate_node(&state, &app, &[request("zlib@1.2")])
        .unwrap();
    assert!(compat.is_ok(), "{compat}");

    let compat = DependenciesValidator {}
        .validate_node(&state, &app, &[request("zlib@1.3:")])
        .unwrap();
    assert!(compat.message().contains("depends on zlib"), "{compat}");
}

#[rstest]
fn test_dependencies_against_pending_requests() {
    let state = State::new(vec![request("app"), request("cmake@3.20:")], vec![]);
    let app = node(plain("app", &["1.0"]), "1.0");

    let compat = DependenciesValidator {}
        .validate_node(&state, &app, &[request("cmake@3.27")])
        .unwrap();
    assert!(compat.is_ok(), "{compat}");

    let compat = DependenciesValidator {}
        .validate_node(&state, &app, &[request("cmake@:3.10")])
        .unwrap();
    assert!(!compat.is_ok());
}

#[rstest]
fn test_dependencies_on_resolved_virtual() {
    let openmpi = Arc::new(node(mpi_provider("mpi@3"), "4.1.5"));
    let state = State::new(vec![request("mpi")], vec![openmpi]);
    let state = with_provider(state, "mpi", "openmpi");
    let app = node(plain("app", &["1.0"]), "1.0");

    let compat = DependenciesValidator {}
        .validate_node(&state, &app, &[request("mpi@3:")])
        .unwrap();
    assert!(compat.is_ok(), "{compat}");
    let compat = DependenciesValidator {}
        .validate_node(&state, &app, &[request("mpi@:2")])
        .unwrap();
    assert!(!compat.is_ok());
}

#[rstest]
fn test_installed_edges_must_agree_on_providers() {
    let state = with_provider(State::default(), "mpi", "mpich");
    let mut app = node(plain("app", &["1.0"]), "1.0");
    app.dependencies.push(SolvedEdge {
        target: key("openmpi"),
        types: BTreeSet::from([EdgeType::Build, EdgeType::Link]),
        virtuals: BTreeSet::from(["mpi".parse().unwrap()]),
    });
    let compat = DependenciesValidator {}
        .validate_node(&state, &app, &[])
        .unwrap();
    assert!(compat.message().contains("mpich provides it"), "{compat}");
}

#[rstest]
fn test_conflicts_from_either_side() {
    let app = def(serde_json::json!({
        "name": "app",
        "versions": ["1.0"],
        "conflicts": [{"spec": "openssl@:1.1", "msg": "needs openssl 3"}],
    }));
    let old = node(plain("openssl", &["1.1.1w", "3.0.2"]), "1.1.1w");
    let new = node(plain("openssl", &["1.1.1w", "3.0.2"]), "3.0.2");

    // the candidate declares the conflict
    let state = State::new(vec![], vec![Arc::new(old.clone())]);
    let compat = ConflictsValidator {}
        .validate_node(&state, &node(Arc::clone(&app), "1.0"), &[])
        .unwrap();
    assert!(compat.message().contains("needs openssl 3"), "{compat}");

    // a resolved node declares the conflict
    let state = State::new(vec![], vec![Arc::new(node(app, "1.0"))]);
    let compat = ConflictsValidator {}
        .validate_node(&state, &old, &[])
        .unwrap();
    assert!(compat.message().contains("app conflicts with"), "{compat}");
    let compat = ConflictsValidator {}
        .validate_node(&state, &new, &[])
        .unwrap();
    assert!(compat.is_ok(), "{compat}");
}

#[rstest]
fn test_default_validators_accept_a_valid_node() {
    let state = State::new(vec![request("zlib")], vec![]);
    let zlib = node(plain("zlib", &["1.3"]), "1.3");
    for validator in default_validators() {
        let compat = validator.validate_node(&state, &zlib, &[]).unwrap();
        assert!(compat.is_ok(), "{validator:?}: {compat}");
    }
}

#[rstest]
fn test_validate_provider() {
    let openmpi = mpi_provider("mpi@3");
    assert!(validate_provider(&request("mpi"), &openmpi).is_ok());
    assert!(validate_provider(&request("mpi@3.1"), &openmpi).is_ok());
    let compat = validate_provider(&request("mpi@:2"), &openmpi);
    assert!(compat.message().contains("does not provide mpi@"), "{compat}");
    let compat = validate_provider(&request("blas"), &openmpi);
    assert_eq!(compat.message(), "openmpi does not provide blas");
}
