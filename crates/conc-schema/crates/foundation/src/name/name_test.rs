// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::{PkgName, PkgNameBuf, VariantName};
use crate::pkg_name;

#[rstest]
#[case("mvapich")]
#[case("mvapich_foo")]
#[case("_mvapich_foo")]
#[case("py-numpy")]
#[case("builtin.mock.zlib")]
#[case("R")]
fn test_package_name_valid(#[case] name: &str) {
    PkgName::new(name).expect("name should be valid");
}

#[rstest]
#[case("")]
#[case("-leading-dash")]
#[case("has space")]
#[case("at@sign")]
#[case("trailing.")]
#[case(".leading")]
fn test_package_name_invalid(#[case] name: &str) {
    assert!(PkgName::new(name).is_err(), "'{name}' should be rejected");
}

#[rstest]
fn test_package_name_namespace() {
    let name: PkgNameBuf = "builtin.mock.zlib".parse().unwrap();
    assert_eq!(name.namespace(), Some("builtin.mock"));
    assert_eq!(name.base_name(), "zlib");

    let plain = pkg_name!("zlib");
    assert_eq!(plain.namespace(), None);
    assert_eq!(plain.base_name(), "zlib");
}

#[rstest]
fn test_variant_name_rejects_namespace() {
    assert!(VariantName::new("debug").is_ok());
    assert!(VariantName::new("qt_4").is_ok());
    assert!(VariantName::new("ns.debug").is_err());
}

#[rstest]
fn test_name_serde() {
    let name: PkgNameBuf = serde_json::from_str("\"mpich\"").unwrap();
    assert_eq!(name, "mpich");
    assert!(serde_json::from_str::<PkgNameBuf>("\"not valid\"").is_err());
}
