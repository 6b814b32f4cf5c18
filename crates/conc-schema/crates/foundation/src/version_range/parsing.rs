// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use nom::IResult;
use nom::branch::alt;
use nom::character::complete::char;
use nom::combinator::{map, opt};
use nom::error::{ContextError, FromExternalError, ParseError, context};
use nom::multi::separated_list1;
use nom::sequence::{pair, preceded};

use super::{
    BoundedRange,
    EXACT_MARK,
    ExactVersion,
    LIST_SEP,
    PrefixVersion,
    RANGE_SEP,
    VersionList,
    VersionRange,
};
use crate::version::parsing::version;

/// Parse a single version range.
///
/// Examples:
/// - `1.2` (prefix)
/// - `=1.2` (exact)
/// - `1.2:1.4`, `1.2:`, `:1.4`, `:`
pub fn version_range<'a, E>(input: &'a str) -> IResult<&'a str, VersionRange, E>
where
    E: ParseError<&'a str>
        + ContextError<&'a str>
        + FromExternalError<&'a str, crate::version::Error>,
{
    context(
        "version_range",
        alt((
            map(preceded(char(EXACT_MARK), version), |v| {
                VersionRange::from(ExactVersion::new(v))
            }),
            map(preceded(char(RANGE_SEP), opt(version)), |upper| {
                VersionRange::from(BoundedRange::new(None, upper))
            }),
            map(
                pair(version, opt(preceded(char(RANGE_SEP), opt(version)))),
                |(lower, upper)| match upper {
                    None => VersionRange::from(PrefixVersion::new(lower)),
                    Some(upper) => VersionRange::from(BoundedRange::new(Some(lower), upper)),
                },
            ),
        )),
    )(input)
}

/// Parse a comma-separated union of version ranges.
pub fn version_list<'a, E>(input: &'a str) -> IResult<&'a str, VersionList, E>
where
    E: ParseError<&'a str>
        + ContextError<&'a str>
        + FromExternalError<&'a str, crate::version::Error>,
{
    context(
        "version_list",
        map(separated_list1(char(LIST_SEP), version_range), VersionList::new),
    )(input)
}
