// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::{BuildSystem, BuildSystemT, CMake, Generic};
use crate::foundation::arch::Arch;
use crate::foundation::variant_map;
use crate::foundation::variant::VariantMap;
use crate::{EdgeType, NodeAttrs};

fn attrs(variants: VariantMap) -> NodeAttrs {
    NodeAttrs {
        name: "zlib".parse().unwrap(),
        version: "1.3".parse().unwrap(),
        compiler: "gcc@12.2.0".parse().unwrap(),
        arch: Arch::new("linux", "ubuntu22.04", "x86_64"),
        variants,
    }
}

#[rstest]
#[case("generic")]
#[case("autotools")]
#[case("cmake")]
#[case("makefile")]
#[case("python")]
fn test_name_round_trip(#[case] name: &str) {
    let bs: BuildSystem = name.parse().unwrap();
    assert_eq!(bs.to_string(), name);
}

#[rstest]
fn test_unknown_build_system() {
    "scons".parse::<BuildSystem>().expect_err("not supported");
    serde_yaml::from_str::<BuildSystem>("meson").expect_err("not supported");
}

#[rstest]
fn test_implicit_dependencies() {
    let cmake = BuildSystem::from(CMake);
    let deps = cmake.implicit_dependencies();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].name, "cmake");
    assert!(deps[0].types.contains(&EdgeType::Build));
    assert!(!deps[0].types.contains(&EdgeType::Link));

    let python: BuildSystem = "python".parse().unwrap();
    let deps = python.implicit_dependencies();
    assert!(deps[0].types.contains(&EdgeType::Run));

    assert!(BuildSystem::from(Generic).implicit_dependencies().is_empty());
}

#[rstest]
fn test_phases_end_with_install() {
    for bs in BuildSystem::ALL {
        assert_eq!(bs.phases().last(), Some(&"install"), "{bs}");
    }
    let autotools: BuildSystem = "autotools".parse().unwrap();
    assert_eq!(autotools.phases()[..2], ["autoreconf", "configure"]);
}

#[rstest]
fn test_build_system_of_node() {
    assert_eq!(
        BuildSystem::of(&attrs(VariantMap::default())),
        Some(BuildSystem::from(Generic))
    );
    assert_eq!(
        BuildSystem::of(&attrs(variant_map! {"build_system" => "cmake"})),
        Some(BuildSystem::from(CMake))
    );
    assert_eq!(
        BuildSystem::of(&attrs(variant_map! {"build_system" => "unknown"})),
        None
    );
}
