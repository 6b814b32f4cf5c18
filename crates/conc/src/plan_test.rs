// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use conc_config::Config;
use conc_schema::foundation::pkg_name;
use conc_schema::{BuildSystem, ConcreteSpec};
use conc_solve_macros::make_repo;
use rstest::rstest;

use super::build_plan;
use crate::Concretizer;

async fn concretize_hdf5(packages: &str) -> ConcreteSpec {
    let repo = make_repo!([
        {"name": "zlib", "versions": ["1.3"]},
        {"name": "cmake", "versions": ["3.27.7"]},
        {
            "name": "hdf5",
            "versions": ["1.14.3"],
            "build_systems": ["cmake", "autotools"],
            "dependencies": ["zlib"]
        }
    ]);
    let config = Config::from_yaml_str(format!(
        "compilers: ['gcc@12.2.0']\ntargets: [linux-ubuntu22.04-x86_64]\n{packages}"
    ))
    .unwrap();
    Concretizer::new(repo.snapshot())
        .with_config(Arc::new(config))
        .concretize_str("hdf5")
        .await
        .unwrap()
}

#[rstest]
#[tokio::test]
async fn test_build_plan_orders_dependencies_first() {
    let spec = concretize_hdf5("").await;
    let plan = build_plan(&spec).unwrap();
    assert_eq!(plan.len(), 3);

    let hdf5 = plan.last().unwrap();
    assert_eq!(hdf5.name, "hdf5");
    assert_eq!(hdf5.build_system.as_str(), "cmake");
    assert_eq!(hdf5.phases, ["cmake", "build", "install"]);
    assert_eq!(hdf5.hash, *spec.root().unwrap().hash());

    for step in &plan[..2] {
        assert!(matches!(step.build_system, BuildSystem::Generic(_)), "{step}");
        assert_eq!(step.phases, ["install"]);
    }
}

#[rstest]
#[tokio::test]
async fn test_build_plan_skips_externals() {
    let spec = concretize_hdf5(
        r#"
packages:
  zlib:
    externals:
      - spec: 'zlib@1.3 %gcc@12.2.0 arch=linux-ubuntu22.04-x86_64'
        prefix: /usr
"#,
    )
    .await;
    assert!(spec.find(pkg_name!("zlib"))[0].external_prefix().is_some());

    let plan = build_plan(&spec).unwrap();
    let names: Vec<_> = plan.iter().map(|step| step.name.to_string()).collect();
    assert_eq!(names, ["cmake", "hdf5"]);
}
