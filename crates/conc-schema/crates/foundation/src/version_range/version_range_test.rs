// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::{VersionList, parse_version_list};
use crate::version::parse_version;

#[rstest]
#[case("1.2", "1.2", true)]
#[case("1.2", "1.2.7", true)]
#[case("1.2", "1.3", false)]
#[case("=1.2", "1.2", true)]
#[case("=1.2", "1.2.1", false)]
#[case("1.2:1.4", "1.2", true)]
#[case("1.2:1.4", "1.4.9", true)]
#[case("1.2:1.4", "1.5", false)]
#[case("1.2:1.4", "1.1.9", false)]
#[case(":2.0", "2.0.5", true)]
#[case(":2.0", "2.1", false)]
#[case("1.5:", "99", true)]
#[case("1.5:", "develop", true)]
#[case(":", "git.abc", true)]
#[case("1:", "git.abc", false)]
#[case("git.abc", "git.abc", true)]
#[case("git.abc", "git.abd", false)]
#[case("1.2:1.4", "git.feature=1.3", true)]
#[case("1.2:1.4,1.6", "1.6.1", true)]
#[case("1.2:1.4,1.6", "1.5", false)]
fn test_contains(#[case] range: &str, #[case] version: &str, #[case] expected: bool) {
    let range = parse_version_list(range).unwrap();
    let version = parse_version(version).unwrap();
    assert_eq!(
        range.contains(&version).is_ok(),
        expected,
        "{range} contains {version}"
    );
}

#[rstest]
#[case("1.2:1.4", "1.3:", "1.3:1.4")]
#[case(":2.0", "1.5:", "1.5:2.0")]
#[case("1.2", "1.2.5", "1.2.5")]
#[case("1.2", "1.2:1.4", "1.2")]
#[case("=1.2.3", "1.2", "=1.2.3")]
#[case(":", "1.2:1.4,1.6", "1.2:1.4,1.6")]
#[case("1:3,5:7", "2:6", "2:3,5:6")]
#[case("git.abc", ":", "git.abc")]
fn test_intersection(#[case] a: &str, #[case] b: &str, #[case] expected: &str) {
    let a = parse_version_list(a).unwrap();
    let b = parse_version_list(b).unwrap();
    let result = a.intersection(&b);
    assert_eq!(result.to_string(), expected);
    let reverse = b.intersection(&a);
    assert_eq!(reverse.to_string(), expected, "intersection should commute");
}

#[rstest]
#[case("1.2:1.4", "1.5:")]
#[case("=1.2", "1.3")]
#[case("1.2", "1.3")]
#[case("git.abc", "1:")]
#[case("git.abc", "git.def")]
#[case(":1.0", "2.0:")]
fn test_intersection_empty(#[case] a: &str, #[case] b: &str) {
    let a = parse_version_list(a).unwrap();
    let b = parse_version_list(b).unwrap();
    assert!(a.intersection(&b).is_empty());
}

#[rstest]
#[case("1.2")]
#[case("=1.2.3")]
#[case("1.2:1.4")]
#[case("1.2:")]
#[case(":1.4")]
#[case(":")]
#[case("1.2:1.4,1.6,=2.0")]
#[case("git.main=1.2:2")]
fn test_display_reparses(#[case] text: &str) {
    let list = parse_version_list(text).unwrap();
    assert_eq!(list.to_string(), text);
    assert_eq!(parse_version_list(list.to_string()).unwrap(), list);
}

#[rstest]
#[case("")]
#[case("1.2::")]
#[case("1.2,")]
#[case("@1.2")]
#[case("==1.2")]
fn test_parse_invalid(#[case] text: &str) {
    parse_version_list(text).expect_err("expected range to be rejected");
}

#[rstest]
fn test_any_and_exact() {
    let any = VersionList::any();
    assert!(any.is_any());
    assert_eq!(any.to_string(), ":");
    let exact = VersionList::exact(parse_version("1.2").unwrap());
    assert_eq!(exact.as_exact().map(|v| v.to_string()), Some("1.2".into()));
    assert!(any.is_superset_of(&exact));
    assert!(!exact.is_superset_of(&any));
}
