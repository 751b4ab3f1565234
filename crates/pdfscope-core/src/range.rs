//! Page-range expressions: `"1,3:5,7,10:"` -> `[1, 3, 4, 5, 7, 10, 11, 12]`.
//!
//! Grammar (comma-separated union of segments):
//! - `n`       a single page
//! - `a:b`     pages a..=b
//! - `a:`      pages a..=total
//! - `:b`      pages 1..=b
//!
//! Bounds policy is deliberately asymmetric: an explicit start past the last page is rejected,
//! while an end past the last page is clamped.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Strictly increasing, deduplicated page numbers, all within `1..=total_pages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageSet(Vec<u32>);

impl PageSet {
    /// Every page of a `total_pages` document.
    pub fn all(total_pages: u32) -> Self {
        Self((1..=total_pages).collect())
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.0.binary_search(&page).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl<'a> IntoIterator for &'a PageSet {
    type Item = &'a u32;
    type IntoIter = std::slice::Iter<'a, u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<PageSet> for Vec<u32> {
    fn from(p: PageSet) -> Self {
        p.0
    }
}

/// One comma-separated unit of a range expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSegment {
    Single(u32),
    Interval { start: Option<u32>, end: Option<u32> },
}

impl RangeSegment {
    /// Parse one trimmed, non-empty segment. Bounds are checked later against the page count.
    pub fn parse(seg: &str) -> Result<Self> {
        match seg.split_once(':') {
            None => Ok(Self::Single(parse_bound(seg, seg, "page")?)),
            Some((a, b)) => {
                let (a, b) = (a.trim(), b.trim());
                if a.is_empty() && b.is_empty() {
                    return Err(segment_err(seg, "interval needs a start or an end"));
                }
                let start = if a.is_empty() {
                    None
                } else {
                    Some(parse_bound(seg, a, "start")?)
                };
                let end = if b.is_empty() {
                    None
                } else {
                    Some(parse_bound(seg, b, "end")?)
                };
                if let (Some(s), Some(e)) = (start, end) {
                    if s > e {
                        return Err(segment_err(
                            seg,
                            format!("start {s} is greater than end {e}"),
                        ));
                    }
                }
                Ok(Self::Interval { start, end })
            }
        }
    }

    /// Concrete pages for this segment in a `total_pages` document.
    pub fn pages(&self, total_pages: u32) -> Result<RangeInclusive<u32>> {
        let (start, end) = match *self {
            Self::Single(p) => (Some(p), Some(p)),
            Self::Interval { start, end } => (start, end),
        };
        if let Some(s) = start {
            if s > total_pages {
                return Err(Error::InvalidRange(format!(
                    "{}: start page {s} exceeds total pages {total_pages}",
                    self.describe()
                )));
            }
        }
        let start = start.unwrap_or(1);
        let end = end.unwrap_or(total_pages).min(total_pages);
        Ok(start..=end)
    }

    fn describe(&self) -> String {
        match *self {
            Self::Single(p) => format!("segment \"{p}\""),
            Self::Interval { start, end } => format!(
                "segment \"{}:{}\"",
                start.map(|s| s.to_string()).unwrap_or_default(),
                end.map(|e| e.to_string()).unwrap_or_default()
            ),
        }
    }
}

fn segment_err(seg: &str, why: impl std::fmt::Display) -> Error {
    Error::InvalidRange(format!("segment \"{seg}\": {why}"))
}

fn parse_bound(seg: &str, s: &str, what: &str) -> Result<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(segment_err(seg, format!("{what} \"{s}\" is not a page number")));
    }
    let n: u32 = s
        .parse()
        .map_err(|_| segment_err(seg, format!("{what} \"{s}\" is out of range")))?;
    if n == 0 {
        return Err(segment_err(seg, format!("{what} must be >= 1 (pages are 1-based)")));
    }
    Ok(n)
}

/// Resolve a range expression against a document with `total_pages` pages.
pub fn resolve(expression: &str, total_pages: u32) -> Result<PageSet> {
    let segments: Vec<&str> = expression
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(Error::InvalidRange(
            "expression is empty (expected e.g. \"1,3:5,7\")".to_string(),
        ));
    }

    let mut pages = BTreeSet::new();
    for seg in segments {
        pages.extend(RangeSegment::parse(seg)?.pages(total_pages)?);
    }
    Ok(PageSet(pages.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn r(e: &str, n: u32) -> Vec<u32> {
        resolve(e, n).expect("valid range").into()
    }

    #[test]
    fn single_pages_and_intervals() {
        assert_eq!(r("5", 10), vec![5]);
        assert_eq!(r("5:10", 12), vec![5, 6, 7, 8, 9, 10]);
        assert_eq!(r("7:", 10), vec![7, 8, 9, 10]);
        assert_eq!(r(":5", 10), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn segments_are_unioned_sorted_and_deduplicated() {
        assert_eq!(r("1,3:5,7,10:", 12), vec![1, 3, 4, 5, 7, 10, 11, 12]);
        assert_eq!(r("9, 2:4, 3, 2", 10), vec![2, 3, 4, 9]);
    }

    #[test]
    fn end_is_clamped_but_start_is_rejected() {
        assert_eq!(r("5:100", 10), vec![5, 6, 7, 8, 9, 10]);
        assert_eq!(r(":100", 3), vec![1, 2, 3]);
        let e = resolve("20", 10).unwrap_err();
        assert!(e.to_string().contains("exceeds total pages 10"), "{e}");
        assert!(resolve("11:12", 10).is_err());
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["", "   ", ",, ,", "5:3", "0", "1:0", "-2", "a", "1:b", ":", "1:2:3", "+4"] {
            match resolve(bad, 10) {
                Err(Error::InvalidRange(_)) => {}
                other => panic!("expected InvalidRange for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn error_names_the_failing_segment() {
        let e = resolve("1,5:3", 10).unwrap_err().to_string();
        assert!(e.contains("\"5:3\""), "{e}");
        assert!(e.contains("greater than end"), "{e}");
    }

    #[test]
    fn empty_segments_between_commas_are_ignored() {
        assert_eq!(r("1,,3", 5), vec![1, 3]);
    }

    proptest! {
        #[test]
        fn resolved_pages_are_strictly_increasing_and_in_bounds(
            total in 1u32..200,
            segs in proptest::collection::vec((0u32..250, 0u32..250, 0u8..4), 1..8),
        ) {
            let expr = segs
                .iter()
                .map(|(a, b, shape)| match shape {
                    0 => format!("{a}"),
                    1 => format!("{a}:{b}"),
                    2 => format!("{a}:"),
                    _ => format!(":{b}"),
                })
                .collect::<Vec<_>>()
                .join(",");
            if let Ok(ps) = resolve(&expr, total) {
                let v = ps.as_slice();
                prop_assert!(v.windows(2).all(|w| w[0] < w[1]));
                prop_assert!(v.iter().all(|p| (1..=total).contains(p)));
            }
        }
    }
}
