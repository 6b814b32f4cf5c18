// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use nom::IResult;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, satisfy};
use nom::combinator::{map_res, opt, recognize};
use nom::error::{ContextError, FromExternalError, ParseError, context};
use nom::sequence::{pair, preceded};

use super::{GIT_PREFIX, Version};

fn is_release_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || super::SEGMENT_SEPARATORS.contains(&c)
}

fn is_reference_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Parse the text of a release version, eg `1.2.3rc1`.
///
/// Releases must begin with a letter or digit.
pub fn release_str<'a, E>(input: &'a str) -> IResult<&'a str, &'a str, E>
where
    E: ParseError<&'a str>,
{
    recognize(pair(
        satisfy(|c| c.is_ascii_alphanumeric()),
        opt(take_while1(is_release_char)),
    ))(input)
}

/// Parse a source revision version, eg `git.abc123` or `git.v2=2.0`.
pub fn revision<'a, E>(input: &'a str) -> IResult<&'a str, Version, E>
where
    E: ParseError<&'a str>
        + ContextError<&'a str>
        + FromExternalError<&'a str, super::Error>,
{
    context(
        "revision",
        map_res(
            preceded(
                tag(GIT_PREFIX),
                pair(
                    take_while1(is_reference_char),
                    opt(preceded(char('='), release_str)),
                ),
            ),
            |(reference, equivalent)| Version::new_revision(reference, equivalent),
        ),
    )(input)
}

/// Parse any version, revision or release.
pub fn version<'a, E>(input: &'a str) -> IResult<&'a str, Version, E>
where
    E: ParseError<&'a str>
        + ContextError<&'a str>
        + FromExternalError<&'a str, super::Error>,
{
    if input.starts_with(GIT_PREFIX) {
        return revision(input);
    }
    context("version", map_res(release_str, Version::new_release))(input)
}
