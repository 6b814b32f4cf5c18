// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::parse_spec;
use crate::foundation::variant::VariantRequest;
use crate::foundation::variant_name;
use crate::{AbstractSpec, Error};

#[rstest]
fn test_parse_full_spec() {
    let spec: AbstractSpec = "hdf5@1.12: +mpi ~shared %gcc@11: target=x86_64 ^openmpi@4"
        .parse()
        .unwrap();
    assert_eq!(spec.name.as_deref().map(|n| n.as_str()), Some("hdf5"));
    assert_eq!(spec.constraints.versions.to_string(), "1.12:");
    let compiler = spec.constraints.compiler.as_ref().unwrap();
    assert_eq!(compiler.to_string(), "gcc@11:");
    assert_eq!(
        spec.constraints.variants.get(variant_name!("mpi")),
        Some(&VariantRequest::Bool(true))
    );
    assert_eq!(
        spec.constraints.variants.get(variant_name!("shared")),
        Some(&VariantRequest::Bool(false))
    );
    assert_eq!(spec.constraints.arch.target.as_deref(), Some("x86_64"));
    assert_eq!(spec.dependencies.len(), 1);
    assert_eq!(spec.dependencies[0].to_string(), "openmpi@4");
}

#[rstest]
#[case("zlib", "zlib")]
#[case("zlib @1.2", "zlib@1.2")]
#[case("zlib@ 1.2 : 1.3", "zlib@1.2:1.3")]
#[case("zlib@:1.3,1.5", "zlib@:1.3,1.5")]
#[case("zlib@=1.2.13", "zlib@=1.2.13")]
#[case("zlib@git.abc=1.2", "zlib@git.abc=1.2")]
#[case("zlib % gcc", "zlib %gcc")]
#[case("zlib -shared", "zlib ~shared")]
#[case("zlib build_type=Release", "zlib build_type=Release")]
#[case("zlib languages = c , cxx", "zlib languages=c,cxx")]
#[case("zlib arch=linux-ubuntu22.04-x86_64", "zlib arch=linux-ubuntu22.04-x86_64")]
#[case("zlib os=ubuntu22.04 platform=linux", "zlib platform=linux os=ubuntu22.04")]
#[case("zlib /ABC12", "zlib /abc12")]
#[case("hdf5 ^zlib ^mpich+fortran", "hdf5 ^zlib ^mpich +fortran")]
fn test_parse_and_format(#[case] text: &str, #[case] expected: &str) {
    let spec: AbstractSpec = text.parse().unwrap();
    assert_eq!(spec.to_string(), expected);
    let again: AbstractSpec = spec.to_string().parse().unwrap();
    assert_eq!(again, spec, "formatted spec should parse back the same");
}

#[rstest]
fn test_range_upper_bound_is_not_a_variant_key() {
    // `1.2:` followed by an assignment must leave the assignment alone
    let spec: AbstractSpec = "zlib@1.2: build_type=Debug".parse().unwrap();
    assert_eq!(spec.constraints.versions.to_string(), "1.2:");
    assert_eq!(spec.constraints.variants.len(), 1);
}

#[rstest]
fn test_parse_anonymous() {
    let spec = parse_spec("+mpi ^zlib@1.2", true).unwrap();
    assert!(spec.is_anonymous());
    assert_eq!(spec.to_string(), "+mpi ^zlib@1.2");

    let spec = parse_spec("build_system=cmake", true).unwrap();
    assert!(spec.is_anonymous(), "an assignment is not a package name");

    parse_spec("+mpi", false).expect_err("named specs require a name");
}

#[rstest]
#[case("")]
#[case("@1.2")]
#[case("zlib@")]
#[case("zlib@1.2@1.3")]
#[case("zlib%")]
#[case("zlib %gcc %clang")]
#[case("zlib+")]
#[case("zlib+shared+shared")]
#[case("zlib build_type=")]
#[case("zlib build_type=Release,")]
#[case("zlib target=a target=b")]
#[case("zlib /")]
#[case("zlib /a /b")]
#[case("zlib ^")]
#[case("zlib ^^zlib")]
#[case("zlib ^+shared")]
#[case("zlib ^mpich ^mpich")]
#[case("zlib !")]
#[case("zlib token")]
fn test_parse_errors(#[case] text: &str) {
    let err = text.parse::<AbstractSpec>().expect_err("expected a parse error");
    assert!(matches!(err, Error::Parse(_)), "{err:?}");
}

#[rstest]
fn test_contradicting_booleans_conflict() {
    let err = "zlib+shared~shared".parse::<AbstractSpec>().unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err:?}");
}

#[rstest]
fn test_parse_error_position() {
    let err = "zlib !".parse::<AbstractSpec>().unwrap_err();
    let Error::Parse(err) = err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(err.position, 5);
}
