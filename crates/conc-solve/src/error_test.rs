// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use conc_schema::foundation::format::FormatError;
use rstest::rstest;

use super::{Error, UnsatisfiableConstraintError};

fn unsatisfiable() -> Error {
    Error::from(UnsatisfiableConstraintError {
        request: "app".into(),
        chain: (1..=7).map(|i| format!("contradiction {i}")).collect(),
    })
}

#[rstest]
#[case::terse(0, 1)]
#[case::verbose(1, 5)]
#[case::everything(3, 7)]
fn test_format_unsatisfiable(#[case] verbosity: u32, #[case] shown: usize) {
    let message = unsatisfiable().format_error(verbosity);
    assert!(message.contains("cannot satisfy app"), "{message}");
    assert!(message.contains(&format!("contradiction {shown}")), "{message}");
    assert!(!message.contains(&format!("contradiction {}", shown + 1)), "{message}");
}

#[rstest]
fn test_format_error_hints() {
    let err = Error::SolverInterrupted("the solve was interrupted".into());
    assert!(err.format_error(0).contains("--verbose"));
    assert!(!err.format_error(3).contains("try '-v"));
}

#[rstest]
fn test_unsatisfiable_display() {
    assert_eq!(
        Error::from(UnsatisfiableConstraintError {
            request: "zlib@9".into(),
            chain: vec!["no declared version of zlib satisfies @9".into()],
        })
        .to_string(),
        "Cannot satisfy zlib@9:\n * no declared version of zlib satisfies @9"
    );
}
