// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::{Arch, ArchSpec};

#[rstest]
#[case("linux-ubuntu22.04-x86_64")]
#[case("darwin-ventura-m1")]
fn test_arch_round_trip(#[case] text: &str) {
    let arch: Arch = text.parse().unwrap();
    assert_eq!(arch.to_string(), text);
}

#[rstest]
#[case("linux")]
#[case("linux-ubuntu")]
#[case("linux--x86_64")]
#[case("linux-ubuntu-x86_64-extra")]
fn test_arch_invalid(#[case] text: &str) {
    text.parse::<Arch>().expect_err("expected arch to be rejected");
}

#[rstest]
fn test_arch_spec_matching() {
    let arch = Arch::new("linux", "rhel9", "x86_64");
    let spec = ArchSpec {
        target: Some("x86_64".into()),
        ..Default::default()
    };
    assert!(spec.satisfied_by(&arch).is_ok());

    let spec = ArchSpec {
        os: Some("ubuntu22.04".into()),
        ..Default::default()
    };
    assert!(!spec.satisfied_by(&arch).is_ok());
}

#[rstest]
fn test_arch_spec_constrain() {
    let a = ArchSpec {
        platform: Some("linux".into()),
        ..Default::default()
    };
    let b = ArchSpec {
        target: Some("aarch64".into()),
        ..Default::default()
    };
    let merged = a.constrain(&b).unwrap();
    assert_eq!(merged.format_spec(), "platform=linux target=aarch64");

    let c = ArchSpec {
        target: Some("x86_64".into()),
        ..Default::default()
    };
    merged
        .constrain(&c)
        .expect_err("different targets should conflict");
}

#[rstest]
fn test_full_arch_spec_formats_as_triplet() {
    let arch = Arch::new("linux", "rhel9", "x86_64");
    assert_eq!(ArchSpec::from(&arch).format_spec(), "arch=linux-rhel9-x86_64");
}
