// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use crate::foundation::arch::Arch;
use crate::foundation::compiler::Compiler;
use crate::foundation::digest::Digest;
use crate::foundation::{pkg_name, variant_map};
use crate::{AbstractSpec, Constraints, NodeAttrs};

fn constraints(text: &str) -> Constraints {
    AbstractSpec::parse_anonymous(text).unwrap().constraints
}

fn zlib() -> NodeAttrs {
    NodeAttrs {
        name: pkg_name!("zlib").to_owned(),
        version: "1.2.13".parse().unwrap(),
        compiler: "gcc@12.2.0".parse::<Compiler>().unwrap(),
        arch: Arch::new("linux", "ubuntu22.04", "x86_64"),
        variants: variant_map! {
            "shared" => true,
            "optimize" => "O2",
            "languages" => ["c", "cxx"],
        },
    }
}

#[rstest]
#[case("", true)]
#[case("@1.2", true)]
#[case("@1.3", false)]
#[case("%gcc", true)]
#[case("%gcc@12", true)]
#[case("%gcc@11", false)]
#[case("%clang", false)]
#[case("+shared", true)]
#[case("~shared", false)]
#[case("optimize=O2", true)]
#[case("optimize=O3", false)]
#[case("languages=c", true)]
#[case("languages=c,fortran", false)]
#[case("+pic", false)]
#[case("target=x86_64", true)]
#[case("os=centos7", false)]
#[case("arch=linux-ubuntu22.04-x86_64", true)]
fn test_satisfied_by(#[case] text: &str, #[case] expected: bool) {
    let compat = constraints(text).satisfied_by(&zlib(), None);
    assert_eq!(compat.is_ok(), expected, "{text}: {compat}");
}

#[rstest]
fn test_hash_requires_known_hash() {
    let digest = Digest::of(b"zlib");
    let prefix = digest.short();
    let wanted = constraints(&format!("/{prefix}"));
    assert!(!wanted.satisfied_by(&zlib(), None).is_ok());
    assert!(wanted.satisfied_by(&zlib(), Some(&digest)).is_ok());
    assert!(!wanted.satisfied_by(&zlib(), Some(&Digest::of(b"other"))).is_ok());
}

#[rstest]
#[case("@1.2:", "@:1.4", "@1.2:1.4")]
#[case("+shared", "optimize=O2", "optimize=O2 +shared")]
#[case("%gcc", "%gcc@12:", "%gcc@12:")]
#[case("target=x86_64", "os=ubuntu22.04", "os=ubuntu22.04 target=x86_64")]
#[case("languages=c", "languages=cxx", "languages=c,cxx")]
#[case("/abc", "/abcdef", "/abcdef")]
fn test_constrain(#[case] a: &str, #[case] b: &str, #[case] expected: &str) {
    let mut merged = constraints(a);
    merged.constrain(&constraints(b)).unwrap();
    assert_eq!(merged.to_string(), expected);

    let mut reverse = constraints(b);
    reverse.constrain(&constraints(a)).unwrap();
    assert_eq!(reverse, merged, "merging should commute");
}

#[rstest]
#[case("@1.2", "@1.3")]
#[case("%gcc", "%clang")]
#[case("%gcc@11", "%gcc@12")]
#[case("+shared", "~shared")]
#[case("target=x86_64", "target=aarch64")]
#[case("/abc", "/abd")]
fn test_constrain_conflicts(#[case] a: &str, #[case] b: &str) {
    let mut merged = constraints(a);
    let before = merged.clone();
    merged
        .constrain(&constraints(b))
        .expect_err("constraints should conflict");
    assert_eq!(merged, before, "a failed merge must not change anything");
}

#[rstest]
fn test_is_empty() {
    assert!(Constraints::default().is_empty());
    assert!(!constraints("+shared").is_empty());
    assert!(!constraints("/abc").is_empty());
}
