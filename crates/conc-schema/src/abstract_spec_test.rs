// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::ResolvedNodes;
use crate::foundation::arch::Arch;
use crate::foundation::digest::Digest;
use crate::foundation::name::PkgName;
use crate::foundation::variant_map;
use crate::{AbstractSpec, NodeAttrs};

struct Resolved(Vec<NodeAttrs>);

impl ResolvedNodes for Resolved {
    fn resolved<'a>(&'a self, name: &PkgName) -> Vec<(&'a NodeAttrs, Option<&'a Digest>)> {
        self.0
            .iter()
            .filter(|a| a.name == *name)
            .map(|a| (a, None))
            .collect()
    }
}

fn attrs(name: &str, version: &str, shared: bool) -> NodeAttrs {
    NodeAttrs {
        name: name.parse().unwrap(),
        version: version.parse().unwrap(),
        compiler: "gcc@12.2.0".parse().unwrap(),
        arch: Arch::new("linux", "ubuntu22.04", "x86_64"),
        variants: variant_map! {"shared" => shared},
    }
}

fn spec(text: &str) -> AbstractSpec {
    AbstractSpec::parse_anonymous(text).unwrap()
}

#[rstest]
#[case("hdf5 +shared", "hdf5 @1.14", "hdf5@1.14 +shared")]
#[case("+shared", "hdf5", "hdf5 +shared")]
#[case("hdf5 ^zlib@1:", "hdf5 ^zlib@:1.3 ^mpich", "hdf5 ^zlib@1:1.3 ^mpich")]
fn test_constrain(#[case] a: &str, #[case] b: &str, #[case] expected: &str) {
    let mut merged = spec(a);
    merged.constrain(&spec(b)).unwrap();
    assert_eq!(merged.to_string(), expected);
}

#[rstest]
#[case("hdf5", "zlib")]
#[case("hdf5 +shared", "hdf5 ~shared")]
#[case("hdf5 ^zlib@1.2", "hdf5 ^zlib@1.3")]
fn test_constrain_conflict(#[case] a: &str, #[case] b: &str) {
    let mut merged = spec(a);
    let before = merged.clone();
    merged.constrain(&spec(b)).expect_err("specs should conflict");
    assert_eq!(merged, before);
}

#[rstest]
fn test_head_ignores_dependencies() {
    let hdf5 = attrs("hdf5", "1.14.3", true);
    assert!(spec("hdf5@1.14 ^zlib@99").head_satisfied_by(&hdf5, None).is_ok());
    assert!(!spec("zlib").head_satisfied_by(&hdf5, None).is_ok());
    assert!(spec("+shared").head_satisfied_by(&hdf5, None).is_ok());
}

#[rstest]
fn test_dependency_predicates() {
    let hdf5 = attrs("hdf5", "1.14.3", true);
    let nodes = Resolved(vec![
        attrs("zlib", "1.2.13", false),
        attrs("zlib", "1.3", true),
    ]);
    // any configuration of a split package may match
    assert!(spec("hdf5 ^zlib+shared").satisfied_by(&hdf5, None, &nodes).is_ok());
    assert!(spec("hdf5 ^zlib@1.2").satisfied_by(&hdf5, None, &nodes).is_ok());
    assert!(!spec("hdf5 ^zlib@1.4").satisfied_by(&hdf5, None, &nodes).is_ok());

    let compat = spec("hdf5 ^mpich").satisfied_by(&hdf5, None, &nodes);
    assert!(compat.message().contains("does not depend on mpich"), "{compat}");
}

#[rstest]
fn test_serde_accepts_anonymous() {
    let parsed: AbstractSpec = serde_yaml::from_str("'+mpi ^zlib'").unwrap();
    assert!(parsed.is_anonymous());
    let text = serde_json::to_string(&spec("hdf5@1.14 +mpi")).unwrap();
    assert_eq!(text, "\"hdf5@1.14 +mpi\"");
    serde_yaml::from_str::<AbstractSpec>("'hdf5 !'").expect_err("invalid spec");
}

#[rstest]
fn test_named_parse_requires_name() {
    "+mpi".parse::<AbstractSpec>().expect_err("a name is required");
    AbstractSpec::try_from("zlib@1.3").unwrap();
}
