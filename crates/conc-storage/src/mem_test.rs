// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_schema::PackageDefinition;
use conc_schema::foundation::pkg_name;
use rstest::rstest;

use super::{MemRepository, PublishPolicy};
use crate::{ConstraintSource, Error};

fn def(name: &str, versions: &[&str]) -> PackageDefinition {
    serde_json::from_value(serde_json::json!({"name": name, "versions": versions})).unwrap()
}

#[rstest]
#[tokio::test]
async fn test_repo_list_empty() {
    let repo = MemRepository::new();
    assert!(
        repo.list_packages().await.unwrap().is_empty(),
        "should not fail when empty"
    );
}

#[rstest]
#[tokio::test]
async fn test_snapshot_is_isolated_from_publish() {
    let repo = MemRepository::from_definitions([def("zlib", &["1.2.13"])]).unwrap();
    let before = repo.snapshot();

    repo.publish(def("zlib", &["1.3", "1.2.13"]), PublishPolicy::OverwriteExisting)
        .unwrap();
    repo.publish(def("cmake", &["3.27.7"]), PublishPolicy::default())
        .unwrap();

    assert_eq!(before.len(), 1);
    assert_eq!(
        before.lookup(pkg_name!("zlib")).await.unwrap().versions().len(),
        1,
        "a snapshot keeps the definitions it was taken with"
    );
    assert_eq!(
        repo.lookup(pkg_name!("zlib")).await.unwrap().versions().len(),
        2
    );
    assert_eq!(repo.list_packages().await.unwrap().len(), 2);
}

#[rstest]
fn test_publish_without_overwrite() {
    let repo = MemRepository::new();
    repo.publish(def("zlib", &["1.3"]), PublishPolicy::DoNotOverwriteExisting)
        .unwrap();
    let err = repo
        .publish(def("zlib", &["1.4"]), PublishPolicy::DoNotOverwriteExisting)
        .unwrap_err();
    assert!(matches!(err, Error::PackageExists(_)), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn test_remove() {
    let repo = MemRepository::from_definitions([def("zlib", &["1.3"])]).unwrap();
    assert!(repo.remove(pkg_name!("zlib")).unwrap().is_some());
    assert!(repo.remove(pkg_name!("zlib")).unwrap().is_none());
    assert!(repo.lookup(pkg_name!("zlib")).await.unwrap_err().is_unknown_package());
}
