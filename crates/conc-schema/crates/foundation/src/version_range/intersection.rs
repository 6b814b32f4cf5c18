// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use super::{BoundedRange, PrefixVersion, Ranged, VersionRange};
use crate::version::Version;

/// A range normalized to its two bounds, used for the algebra.
struct Bounds<'a> {
    lower: Option<&'a Version>,
    upper: Option<&'a Version>,
}

impl<'a> Bounds<'a> {
    fn of(range: &'a VersionRange) -> Self {
        Self {
            lower: range.lower_bound(),
            upper: range.upper_bound(),
        }
    }
}

fn max_lower<'a>(a: Option<&'a Version>, b: Option<&'a Version>) -> Option<&'a Version> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// The upper bound that admits fewer versions.
///
/// Because upper bounds match by prefix, `1.2.5` is tighter than `1.2`
/// even though it sorts after it.
fn tighter_upper<'a>(a: Option<&'a Version>, b: Option<&'a Version>) -> Option<&'a Version> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if a.is_prefix_of(b) {
                Some(b)
            } else if b.is_prefix_of(a) {
                Some(a)
            } else {
                Some(a.min(b))
            }
        }
        (a, None) => a,
        (None, b) => b,
    }
}

pub(super) fn intersect(a: &VersionRange, b: &VersionRange) -> Option<VersionRange> {
    // a range that pins one version intersects as that version
    if let Some(pinned) = a.as_exact() {
        return b.contains(pinned).is_ok().then(|| a.clone());
    }
    if let Some(pinned) = b.as_exact() {
        return a.contains(pinned).is_ok().then(|| b.clone());
    }

    let a = Bounds::of(a);
    let b = Bounds::of(b);
    let lower = max_lower(a.lower, b.lower);
    let upper = tighter_upper(a.upper, b.upper);
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if lower > upper && !upper.is_prefix_of(lower) {
            return None;
        }
        if lower == upper {
            return Some(PrefixVersion::new(lower.clone()).into());
        }
    }
    Some(BoundedRange::new(lower.cloned(), upper.cloned()).into())
}
