//! Bookmark tree normalisation: depth-bounded conversion, optional flattening, summary counts.

use crate::{DestinationResolver, Error, RawDestination, RawOutlineNode, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Hard ceiling on traversal depth, applied even when the caller sets none.
pub const DEFAULT_MAX_DEPTH: usize = 50;
pub const MAX_DEPTH_RANGE: RangeInclusive<usize> = 1..=10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutlineOptions {
    pub include_destinations: bool,
    pub max_depth: Option<usize>,
    pub flatten: bool,
}

impl OutlineOptions {
    pub fn validate(&self) -> Result<()> {
        match self.max_depth {
            Some(d) if !MAX_DEPTH_RANGE.contains(&d) => Err(Error::InvalidParams(format!(
                "max_depth must be in {}..={} (got {d})",
                MAX_DEPTH_RANGE.start(),
                MAX_DEPTH_RANGE.end()
            ))),
            _ => Ok(()),
        }
    }

    fn depth_limit(&self) -> usize {
        self.max_depth
            .unwrap_or(DEFAULT_MAX_DEPTH)
            .min(DEFAULT_MAX_DEPTH)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,
    /// 0 for top-level bookmarks. Kept as-is when flattened.
    pub level: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<RawDestination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
    /// `None` once flattened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<OutlineNode>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSummary {
    pub total_items: usize,
    /// Number of levels present (deepest `level + 1`).
    pub max_depth: usize,
    pub items_with_pages: usize,
    pub items_with_urls: usize,
}

impl OutlineSummary {
    pub fn of(nodes: &[OutlineNode]) -> Self {
        let mut s = Self::default();
        s.add(nodes);
        s
    }

    fn add(&mut self, nodes: &[OutlineNode]) {
        for n in nodes {
            self.total_items += 1;
            self.max_depth = self.max_depth.max(n.level + 1);
            if n.page.is_some() {
                self.items_with_pages += 1;
            }
            if n.url.is_some() {
                self.items_with_urls += 1;
            }
            if let Some(kids) = &n.children {
                self.add(kids);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineResult {
    pub has_outline: bool,
    pub flattened: bool,
    pub items: Vec<OutlineNode>,
    pub summary: OutlineSummary,
    /// Bookmarks whose target could not be mapped to a page.
    pub unresolved_destinations: usize,
}

impl OutlineResult {
    fn empty(flattened: bool) -> Self {
        Self {
            has_outline: false,
            flattened,
            items: Vec::new(),
            summary: OutlineSummary::default(),
            unresolved_destinations: 0,
        }
    }
}

struct Walk<'a> {
    opts: &'a OutlineOptions,
    limit: usize,
    resolver: &'a dyn DestinationResolver,
    unresolved: usize,
}

impl Walk<'_> {
    fn convert(&mut self, raw: &RawOutlineNode, level: usize) -> OutlineNode {
        let page = raw
            .destination
            .as_ref()
            .and_then(|d| match self.resolver.resolve_page(d) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::debug!(title = %raw.title, error = %e, "bookmark target unresolved");
                    self.unresolved += 1;
                    None
                }
            });
        let children = if level >= self.limit {
            Vec::new()
        } else {
            raw.children
                .iter()
                .map(|c| self.convert(c, level + 1))
                .collect()
        };
        OutlineNode {
            title: raw.title.clone(),
            level,
            page,
            destination: if self.opts.include_destinations {
                raw.destination.clone()
            } else {
                None
            },
            url: raw.url.clone(),
            bold: raw.bold.then_some(true),
            italic: raw.italic.then_some(true),
            color: raw.color,
            children: Some(children),
        }
    }
}

/// Pre-order flattening; levels keep their original values.
pub fn flatten(nodes: Vec<OutlineNode>) -> Vec<OutlineNode> {
    fn go(nodes: Vec<OutlineNode>, out: &mut Vec<OutlineNode>) {
        for mut n in nodes {
            let kids = n.children.take().unwrap_or_default();
            out.push(n);
            go(kids, out);
        }
    }
    let mut out = Vec::new();
    go(nodes, &mut out);
    out
}

/// Normalise a raw bookmark forest. `None` (or an empty forest) is "no outline", not an error.
pub fn normalize(
    raw: Option<&[RawOutlineNode]>,
    opts: &OutlineOptions,
    resolver: &dyn DestinationResolver,
) -> Result<OutlineResult> {
    opts.validate()?;
    let raw = match raw {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(OutlineResult::empty(opts.flatten)),
    };

    let mut walk = Walk {
        opts,
        limit: opts.depth_limit(),
        resolver,
        unresolved: 0,
    };
    let mut items: Vec<OutlineNode> = raw.iter().map(|n| walk.convert(n, 0)).collect();
    if opts.flatten {
        items = flatten(items);
    }
    Ok(OutlineResult {
        has_outline: true,
        flattened: opts.flatten,
        summary: OutlineSummary::of(&items),
        items,
        unresolved_destinations: walk.unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexOnlyResolver;

    fn node(title: &str, page: Option<u32>, children: Vec<RawOutlineNode>) -> RawOutlineNode {
        RawOutlineNode {
            title: title.to_string(),
            destination: page.map(|p| RawDestination::PageIndex { index: p - 1 }),
            children,
            ..Default::default()
        }
    }

    fn three_level() -> Vec<RawOutlineNode> {
        vec![
            node(
                "Chapter 1",
                Some(1),
                vec![node("1.1", Some(2), vec![node("1.1.1", Some(3), vec![])])],
            ),
            node("Chapter 2", Some(5), vec![node("2.1", None, vec![])]),
        ]
    }

    #[test]
    fn no_outline_is_not_an_error() {
        for raw in [None, Some(&[][..])] {
            let r = normalize(raw, &OutlineOptions::default(), &IndexOnlyResolver).unwrap();
            assert!(!r.has_outline);
            assert!(r.items.is_empty());
            assert_eq!(r.summary, OutlineSummary::default());
        }
    }

    #[test]
    fn tree_keeps_levels_and_resolves_pages() {
        let raw = three_level();
        let r = normalize(Some(raw.as_slice()), &OutlineOptions::default(), &IndexOnlyResolver).unwrap();
        assert!(r.has_outline);
        assert_eq!(r.items.len(), 2);
        let c1 = &r.items[0];
        assert_eq!((c1.level, c1.page), (0, Some(1)));
        let sub = &c1.children.as_ref().unwrap()[0];
        assert_eq!((sub.level, sub.page), (1, Some(2)));
        assert_eq!(sub.children.as_ref().unwrap()[0].level, 2);
        assert_eq!(
            r.summary,
            OutlineSummary {
                total_items: 5,
                max_depth: 3,
                items_with_pages: 4,
                items_with_urls: 0
            }
        );
        assert!(c1.destination.is_none());
    }

    #[test]
    fn max_depth_truncates_silently() {
        let raw = three_level();
        let opts = OutlineOptions {
            max_depth: Some(1),
            ..Default::default()
        };
        let r = normalize(Some(raw.as_slice()), &opts, &IndexOnlyResolver).unwrap();
        let sub = &r.items[0].children.as_ref().unwrap()[0];
        assert_eq!(sub.title, "1.1");
        assert!(sub.children.as_ref().unwrap().is_empty());
        assert_eq!(r.summary.total_items, 4);
        assert_eq!(r.summary.max_depth, 2);
    }

    #[test]
    fn flattening_is_preorder_and_keeps_levels() {
        let raw: Vec<RawOutlineNode> = (1..=3)
            .map(|i| {
                node(
                    &format!("{i}"),
                    None,
                    vec![
                        node(&format!("{i}.a"), None, vec![]),
                        node(&format!("{i}.b"), None, vec![]),
                    ],
                )
            })
            .collect();
        let opts = OutlineOptions {
            flatten: true,
            ..Default::default()
        };
        let r = normalize(Some(raw.as_slice()), &opts, &IndexOnlyResolver).unwrap();
        assert_eq!(r.items.len(), 9);
        let titles: Vec<&str> = r.items.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(
            titles,
            ["1", "1.a", "1.b", "2", "2.a", "2.b", "3", "3.a", "3.b"]
        );
        let levels: Vec<usize> = r.items.iter().map(|n| n.level).collect();
        assert_eq!(levels, [0, 1, 1, 0, 1, 1, 0, 1, 1]);
        assert!(r.items.iter().all(|n| n.children.is_none()));
        assert_eq!(r.summary.total_items, 9);
        assert_eq!(r.summary.max_depth, 2);
    }

    #[test]
    fn unresolvable_destination_only_drops_that_page() {
        let mut raw = three_level();
        raw[0].destination = Some(RawDestination::Named {
            name: "missing".into(),
        });
        raw[1].url = Some("https://example.com".into());
        raw[1].bold = true;
        let opts = OutlineOptions {
            include_destinations: true,
            ..Default::default()
        };
        let r = normalize(Some(raw.as_slice()), &opts, &IndexOnlyResolver).unwrap();
        assert_eq!(r.items[0].page, None);
        assert!(matches!(
            r.items[0].destination,
            Some(RawDestination::Named { .. })
        ));
        assert_eq!(r.items[1].page, Some(5));
        assert_eq!(r.items[1].bold, Some(true));
        assert_eq!(r.items[1].italic, None);
        assert_eq!(r.unresolved_destinations, 1);
        assert_eq!(r.summary.items_with_urls, 1);
        assert_eq!(r.summary.items_with_pages, 3);
    }

    #[test]
    fn internal_ceiling_bounds_pathological_depth() {
        let mut deep = node("leaf", None, vec![]);
        for i in 0..200 {
            deep = node(&format!("n{i}"), None, vec![deep]);
        }
        let r = normalize(Some(&[deep][..]), &OutlineOptions::default(), &IndexOnlyResolver).unwrap();
        assert_eq!(r.summary.max_depth, DEFAULT_MAX_DEPTH + 1);
    }

    #[test]
    fn rejects_out_of_range_max_depth() {
        let opts = OutlineOptions {
            max_depth: Some(11),
            ..Default::default()
        };
        assert!(matches!(
            normalize(None, &opts, &IndexOnlyResolver),
            Err(Error::InvalidParams(_))
        ));
    }
}
