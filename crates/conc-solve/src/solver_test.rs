// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use conc_config::Config;
use conc_schema::foundation::arch::Arch;
use conc_schema::foundation::fixtures::init_logging;
use conc_schema::foundation::pkg_name;
use conc_schema::foundation::variant::VariantMap;
use conc_schema::{
    AbstractSpec,
    ConcreteEdge,
    ConcreteNode,
    ConcreteSpec,
    EdgeType,
    NodeAttrs,
};
use conc_solve_macros::make_repo;
use conc_storage::{MemIndex, MemRepository};
use rstest::{fixture, rstest};

use super::Solver;
use crate::Error;

static BASE_CONFIG: &str = r#"
compilers: ['gcc@12.2.0', 'clang@16.0.6']
targets: [linux-ubuntu22.04-x86_64]
packages:
  all:
    compiler: [gcc]
"#;

fn config_with(extra: &str) -> Arc<Config> {
    Arc::new(Config::from_yaml_str(format!("{BASE_CONFIG}{extra}")).unwrap())
}

#[fixture]
fn config() -> Arc<Config> {
    config_with("")
}

fn solver_for(repo: MemRepository, config: Arc<Config>, specs: &[&str]) -> Solver {
    let mut solver = Solver::new(repo);
    solver.set_config(config);
    for spec in specs {
        solver.add_request(spec.parse().unwrap()).unwrap();
    }
    solver
}

fn installed(name: &str, version: &str, dependencies: Vec<ConcreteEdge>) -> ConcreteNode {
    let attrs = NodeAttrs {
        name: name.parse().unwrap(),
        version: version.parse().unwrap(),
        compiler: "gcc@12.2.0".parse().unwrap(),
        arch: Arch::new("linux", "ubuntu22.04", "x86_64"),
        variants: VariantMap::default(),
    };
    ConcreteNode::new(attrs, dependencies).unwrap()
}

/// An installed libpng, built against an older zlib
fn installed_libpng() -> ConcreteSpec {
    let mut builder = ConcreteSpec::builder();
    let zlib = builder
        .insert(installed("zlib", "1.2.13", Vec::new()))
        .unwrap();
    let edge = ConcreteEdge {
        name: zlib.name().to_owned(),
        hash: *zlib.hash(),
        types: BTreeSet::from([EdgeType::Build, EdgeType::Link]),
        virtuals: BTreeSet::new(),
    };
    let libpng = builder
        .insert(installed("libpng", "1.6.39", vec![edge]))
        .unwrap();
    builder.add_root(*libpng.hash()).unwrap();
    builder.build()
}

fn zlib_and_libpng() -> MemRepository {
    make_repo!([
        {"name": "zlib", "versions": ["1.3", "1.2.13"]},
        {"name": "libpng", "versions": ["1.6.40", "1.6.39"], "dependencies": ["zlib"]}
    ])
}

#[rstest]
#[tokio::test]
async fn test_solver_no_requests(config: Arc<Config>) {
    let mut solver = solver_for(MemRepository::new(), config, &[]);
    let solution = solver.solve().await.unwrap();
    assert!(solution.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_solver_single_package_no_deps(config: Arc<Config>) {
    init_logging();
    let repo = make_repo!([{"name": "zlib", "versions": ["1.2.13", "1.3"]}]);
    let mut solver = solver_for(repo, config, &["zlib"]);

    let solution = solver.solve().await.unwrap();
    assert_eq!(solution.len(), 1);
    let zlib = solution.find(pkg_name!("zlib"));
    assert_eq!(zlib[0].attrs.version.to_string(), "1.3", "newest version first");
    assert_eq!(zlib[0].attrs.compiler.to_string(), "gcc@12.2.0");
    assert!(zlib[0].source.is_build());
    assert!(solver.get_number_of_steps() > 0);
}

#[rstest]
#[tokio::test]
async fn test_solver_single_package_simple_deps(config: Arc<Config>) {
    let repo = make_repo!([
        {"name": "zlib", "versions": ["1.3", "1.2.13"]},
        {"name": "libpng", "versions": ["1.6.40"], "dependencies": ["zlib@1.2"]}
    ]);
    let mut solver = solver_for(repo, config, &["libpng"]);

    let spec = solver.solve_concrete().await.unwrap();
    assert_eq!(spec.len(), 2);
    let root = spec.root().unwrap();
    assert_eq!(root.name(), pkg_name!("libpng"));
    let zlib = spec.find(pkg_name!("zlib"));
    assert_eq!(zlib[0].attrs().version.to_string(), "1.2.13");
    assert_eq!(root.dependencies()[0].hash, *zlib[0].hash());
}

#[rstest]
#[tokio::test]
async fn test_solver_unifies_shared_dependencies(config: Arc<Config>) {
    let repo = make_repo!([
        {"name": "r", "versions": ["1.0"], "dependencies": ["b", "c"]},
        {"name": "b", "versions": ["1.0"], "dependencies": ["d@:2.0"]},
        {"name": "c", "versions": ["1.0"], "dependencies": ["d@1.5:"]},
        {"name": "d", "versions": ["2.1", "2.0", "1.8", "1.5", "1.0"]}
    ]);
    let mut solver = solver_for(repo, config, &["r"]);

    let spec = solver.solve_concrete().await.unwrap();
    let d = spec.find(pkg_name!("d"));
    assert_eq!(d.len(), 1, "d must be shared by b and c");
    assert_eq!(d[0].attrs().version.to_string(), "2.0");
    for dependent in ["b", "c"] {
        let node = spec.find(pkg_name!(dependent))[0];
        assert_eq!(node.dependencies()[0].hash, *d[0].hash());
    }
}

#[rstest]
#[tokio::test]
async fn test_solver_steps_back_on_contradiction(config: Arc<Config>) {
    let repo = make_repo!([
        {"name": "app", "versions": ["1.0"], "dependencies": ["lib"]},
        {
            "name": "lib",
            "versions": ["2.0", "1.0"],
            "dependencies": [
                {"spec": "dep@2", "when": "@2.0"},
                {"spec": "dep@1", "when": "@1.0"}
            ]
        },
        {"name": "dep", "versions": ["1.4"]}
    ]);
    let mut solver = solver_for(repo, config, &["app"]);

    let solution = solver.solve().await.unwrap();
    let lib = solution.find(pkg_name!("lib"));
    assert_eq!(lib[0].attrs.version.to_string(), "1.0");
    assert!(solver.get_number_of_steps_back() > 0);
    assert!(
        solver
            .error_frequency()
            .keys()
            .any(|message| message.contains("could not satisfy 'dep@2'")),
        "{:?}",
        solver.error_frequency()
    );
}

#[rstest]
#[tokio::test]
async fn test_solver_version_outside_declared_versions(config: Arc<Config>) {
    let repo = make_repo!([{"name": "zlib", "versions": ["1.3", "1.2.13"]}]);
    let mut solver = solver_for(repo, config, &["zlib@9"]);

    match solver.solve().await {
        Err(Error::Unsatisfiable(err)) => {
            assert!(
                err.chain
                    .iter()
                    .any(|link| link.contains("no declared version of zlib")),
                "{err}"
            );
        }
        other => panic!("expected an unsatisfiable request, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_solver_unknown_root_is_fatal(config: Arc<Config>) {
    let repo = make_repo!([{"name": "zlib", "versions": ["1.3"]}]);
    let mut solver = solver_for(repo, config, &["zlibb"]);

    match solver.solve().await {
        Err(Error::UnknownPackage(err)) => assert_eq!(err.name, "zlibb"),
        other => panic!("expected an unknown package, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_solver_unknown_dependency_is_unsatisfiable(config: Arc<Config>) {
    let repo = make_repo!([{"name": "app", "versions": ["1.0"], "dependencies": ["nosuch"]}]);
    let mut solver = solver_for(repo, config, &["app"]);

    match solver.solve().await {
        Err(Error::Unsatisfiable(err)) => {
            assert!(err.chain.iter().any(|link| link.contains("'nosuch' not found")), "{err}");
        }
        other => panic!("expected an unsatisfiable request, got {other:?}"),
    }
}

fn mpi_repo() -> MemRepository {
    make_repo!([
        {"name": "app", "versions": ["1.0"], "dependencies": ["mpi"]},
        {"name": "mpich", "versions": ["4.1.2"], "provides": ["mpi@3"]},
        {"name": "openmpi", "versions": ["4.1.5"], "provides": ["mpi@3"]}
    ])
}

#[rstest]
#[case::lexical_by_default("", "mpich")]
#[case::configured(
    "  mpi:\n    providers:\n      mpi: [openmpi, mpich]\n",
    "openmpi"
)]
#[tokio::test]
async fn test_solver_provider_preference(#[case] packages: &str, #[case] expected: &str) {
    let config = config_with(packages);
    let mut solver = solver_for(mpi_repo(), config, &["app"]);

    let solution = solver.solve().await.unwrap();
    assert_eq!(solution.provider(pkg_name!("mpi")).unwrap(), expected);
    assert_eq!(solution.len(), 2);

    let spec = solution.assemble().unwrap();
    let app = spec.root().unwrap();
    assert_eq!(app.dependencies()[0].name, expected);
    assert!(app.dependencies()[0].virtuals.contains(pkg_name!("mpi")));
}

#[rstest]
#[tokio::test]
async fn test_solver_provider_must_provide_requested_versions(config: Arc<Config>) {
    let repo = make_repo!([
        {"name": "app", "versions": ["1.0"], "dependencies": ["mpi@3:"]},
        {"name": "mpich", "versions": ["1.0"], "provides": ["mpi@2"]},
        {"name": "openmpi", "versions": ["4.1.5"], "provides": ["mpi@3"]}
    ]);
    let mut solver = solver_for(repo, config, &["app"]);

    let solution = solver.solve().await.unwrap();
    assert_eq!(solution.provider(pkg_name!("mpi")).unwrap(), "openmpi");
    assert!(solution.find(pkg_name!("mpich")).is_empty());
}

#[rstest]
#[tokio::test]
async fn test_solver_virtual_root(config: Arc<Config>) {
    let mut solver = solver_for(mpi_repo(), config, &["mpi"]);
    let spec = solver.solve_concrete().await.unwrap();
    assert_eq!(spec.root().unwrap().name(), pkg_name!("mpich"));
}

#[rstest]
#[tokio::test]
async fn test_solver_dependency_cycle(config: Arc<Config>) {
    let repo = make_repo!([
        {"name": "x", "versions": ["1.0"], "dependencies": ["y"]},
        {"name": "y", "versions": ["1.0"], "dependencies": ["x"]}
    ]);
    let mut solver = solver_for(repo, config, &["x"]);

    match solver.solve().await {
        Err(Error::Cycle(err)) => assert_eq!(err.cycle, ["y", "x", "y"]),
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[rstest]
#[case::enabled("app +ssl", true)]
#[case::disabled("app", false)]
#[tokio::test]
async fn test_solver_conditional_dependency(
    config: Arc<Config>,
    #[case] request: &str,
    #[case] expected: bool,
) {
    let repo = make_repo!([
        {
            "name": "app",
            "versions": ["1.0"],
            "variants": {"ssl": {"default": false}},
            "dependencies": [{"spec": "openssl", "when": "+ssl"}]
        },
        {"name": "openssl", "versions": ["3.0.2"]}
    ]);
    let mut solver = solver_for(repo, config, &[request]);

    let solution = solver.solve().await.unwrap();
    assert_eq!(!solution.find(pkg_name!("openssl")).is_empty(), expected);
}

#[rstest]
#[tokio::test]
async fn test_solver_dependency_only_constraints(config: Arc<Config>) {
    let mut solver = solver_for(zlib_and_libpng(), Arc::clone(&config), &["libpng ^zlib@1.2"]);
    let solution = solver.solve().await.unwrap();
    let zlib = solution.find(pkg_name!("zlib"));
    assert_eq!(zlib[0].attrs.version.to_string(), "1.2.13");

    let mut solver = solver_for(zlib_and_libpng(), config, &["zlib ^libpng"]);
    match solver.solve().await {
        Err(Error::Unsatisfiable(err)) => {
            let unused = |link: &String| link.contains("does not depend on libpng");
            assert!(err.chain.iter().any(unused), "{err}");
        }
        other => panic!("expected an unsatisfiable request, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_solver_compiler_is_inherited(config: Arc<Config>) {
    let mut solver = solver_for(zlib_and_libpng(), config, &["libpng %clang"]);
    let solution = solver.solve().await.unwrap();
    let zlib = solution.find(pkg_name!("zlib"));
    assert_eq!(zlib[0].attrs.compiler.to_string(), "clang@16.0.6");
}

#[rstest]
#[tokio::test]
async fn test_solver_prefers_installed(config: Arc<Config>) {
    let mut solver = solver_for(zlib_and_libpng(), config, &["libpng"]);
    solver.set_installed_index(Arc::new(MemIndex::from_iter([installed_libpng()])));

    let spec = solver.solve_concrete().await.unwrap();
    let root = spec.root().unwrap();
    assert_eq!(root.attrs().version.to_string(), "1.6.39");
    let zlib = spec.find(pkg_name!("zlib"));
    assert_eq!(zlib[0].attrs().version.to_string(), "1.2.13", "pinned by the installation");
    assert_eq!(
        root.hash(),
        installed_libpng().root().unwrap().hash(),
        "the installed graph is reused as is"
    );
}

#[rstest]
#[case::disabled("disabled", "1.6.40", "1.3")]
#[case::dependencies("dependencies", "1.6.40", "1.2.13")]
#[tokio::test]
async fn test_solver_reuse_policy(
    #[case] policy: &str,
    #[case] libpng: &str,
    #[case] zlib: &str,
) {
    let config = config_with(&format!("solver:\n  reuse: {policy}\n"));
    let mut solver = solver_for(zlib_and_libpng(), config, &["libpng"]);
    solver.set_installed_index(Arc::new(MemIndex::from_iter([installed_libpng()])));

    let solution = solver.solve().await.unwrap();
    let root = solution.find(pkg_name!("libpng"));
    assert_eq!(root[0].attrs.version.to_string(), libpng);
    assert!(root[0].source.is_build());
    let dep = solution.find(pkg_name!("zlib"));
    assert_eq!(dep[0].attrs.version.to_string(), zlib);
}

#[rstest]
#[tokio::test]
async fn test_solver_externals_and_buildable() {
    let config = config_with(
        r#"
  openssl:
    buildable: false
    externals:
      - spec: 'openssl@3.0.2 %gcc@11.4.0 arch=linux-ubuntu22.04-x86_64'
        prefix: /usr
  cmake:
    buildable: false
"#,
    );
    let repo = || {
        make_repo!([
            {"name": "openssl", "versions": ["3.1.4", "3.0.2"]},
            {"name": "cmake", "versions": ["3.27.7"]}
        ])
    };

    let mut solver = solver_for(repo(), Arc::clone(&config), &["openssl"]);
    let spec = solver.solve_concrete().await.unwrap();
    let openssl = spec.root().unwrap();
    assert_eq!(openssl.attrs().version.to_string(), "3.0.2");
    assert_eq!(openssl.external_prefix(), Some(std::path::Path::new("/usr")));

    let mut solver = solver_for(repo(), config, &["cmake"]);
    match solver.solve().await {
        Err(Error::Unsatisfiable(err)) => {
            assert!(err.chain.iter().any(|link| link.contains("not buildable")), "{err}");
        }
        other => panic!("expected an unsatisfiable request, got {other:?}"),
    }
}

fn split_repo() -> MemRepository {
    make_repo!([
        {
            "name": "app",
            "versions": ["1.0"],
            "dependencies": ["lib", {"spec": "tool@2", "types": ["build"]}]
        },
        {
            "name": "lib",
            "versions": ["1.0"],
            "dependencies": [{"spec": "tool@1", "types": ["build"]}]
        },
        {"name": "tool", "versions": ["2.0", "1.0"], "unification_exempt": true}
    ])
}

#[rstest]
#[tokio::test]
async fn test_solver_unification_exempt_packages_split(config: Arc<Config>) {
    let mut solver = solver_for(split_repo(), config, &["app"]);
    let spec = solver.solve_concrete().await.unwrap();
    let versions: BTreeSet<String> = spec
        .find(pkg_name!("tool"))
        .iter()
        .map(|n| n.attrs().version.to_string())
        .collect();
    assert_eq!(versions, BTreeSet::from(["1.0".to_string(), "2.0".to_string()]));
}

#[rstest]
#[tokio::test]
async fn test_solver_strict_unification_ignores_exemptions() {
    let config = config_with("solver:\n  unify: strict\n");
    let mut solver = solver_for(split_repo(), config, &["app"]);
    assert!(matches!(solver.solve().await, Err(Error::Unsatisfiable(_))));
}

#[rstest]
#[tokio::test]
async fn test_solver_is_deterministic(config: Arc<Config>) {
    let mut hashes = Vec::new();
    for _ in 0..2 {
        let mut solver = solver_for(mpi_repo(), Arc::clone(&config), &["app"]);
        let spec = solver.solve_concrete().await.unwrap();
        hashes.push(*spec.root().unwrap().hash());
    }
    assert_eq!(hashes[0], hashes[1]);
}

#[rstest]
#[tokio::test]
async fn test_solver_interrupted(config: Arc<Config>) {
    let mut solver = solver_for(zlib_and_libpng(), config, &["libpng"]);
    solver.interrupt();
    assert!(matches!(solver.solve().await, Err(Error::SolverInterrupted(_))));

    solver.reset();
    solver.add_request("zlib".parse().unwrap()).unwrap();
    solver.solve().await.expect("reset clears the interruption");
}

#[rstest]
#[tokio::test]
async fn test_solver_timeout(config: Arc<Config>) {
    let mut solver = solver_for(zlib_and_libpng(), config, &["libpng"]);
    solver.set_timeout(Some(Duration::ZERO));
    match solver.solve().await {
        Err(Error::SolverInterrupted(message)) => assert!(message.contains("did not finish")),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_solver_anonymous_request_is_rejected(config: Arc<Config>) {
    let mut solver = solver_for(MemRepository::new(), config, &[]);
    let anonymous = AbstractSpec::parse_anonymous("@1.0 +shared").unwrap();
    let err = solver
        .add_request(anonymous)
        .expect_err("anonymous specs cannot be concretized");
    assert!(err.to_string().contains("anonymous spec"), "{err}");
    assert!(solver.roots().is_empty());
}
