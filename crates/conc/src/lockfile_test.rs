// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use conc_config::Config;
use conc_schema::{ConcreteSpec, Lockfile};
use conc_solve_macros::make_repo;
use rstest::{fixture, rstest};

use super::{read_lockfile, write_lockfile};
use crate::{Concretizer, Error};

#[fixture]
async fn libpng() -> ConcreteSpec {
    let repo = make_repo!([
        {"name": "zlib", "versions": ["1.3", "1.2.13"]},
        {"name": "libpng", "versions": ["1.6.40"], "dependencies": ["zlib"]}
    ]);
    let config =
        Config::from_yaml_str("compilers: ['gcc@12.2.0']\ntargets: [linux-ubuntu22.04-x86_64]")
            .unwrap();
    Concretizer::new(repo.snapshot())
        .with_config(Arc::new(config))
        .concretize_str("libpng")
        .await
        .unwrap()
}

#[rstest]
#[case::yaml("conc.lock.yaml")]
#[case::json("conc.lock.json")]
#[tokio::test]
async fn test_lockfile_round_trip(#[future] libpng: ConcreteSpec, #[case] filename: &str) {
    let spec = libpng.await;
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join(filename);

    write_lockfile(&spec, &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    if filename.ends_with(".json") {
        assert!(text.trim_start().starts_with('{'), "{text}");
    }
    assert_eq!(read_lockfile(&path).unwrap(), spec);
}

#[rstest]
#[tokio::test]
async fn test_lockfile_detects_tampering(#[future] libpng: ConcreteSpec) {
    let spec = libpng.await;
    let mut lockfile = Lockfile::from(&spec);
    lockfile.nodes[0].attrs.version = "1.2.13".parse().unwrap();

    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("conc.lock.json");
    std::fs::write(&path, serde_json::to_string(&lockfile).unwrap()).unwrap();

    let err = read_lockfile(&path).unwrap_err();
    assert!(
        matches!(err, Error::Schema(conc_schema::Error::HashMismatch(_))),
        "{err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn test_lockfile_io_errors(#[future] libpng: ConcreteSpec) {
    let spec = libpng.await;
    let tmpdir = tempfile::tempdir().unwrap();
    let missing = tmpdir.path().join("missing").join("conc.lock.yaml");

    let err = write_lockfile(&spec, &missing).unwrap_err();
    assert!(matches!(err, Error::FileWriteError(..)), "{err:?}");
    let err = read_lockfile(&missing).unwrap_err();
    assert!(
        matches!(err, Error::Schema(conc_schema::Error::FileReadError(..))),
        "{err:?}"
    );
}
