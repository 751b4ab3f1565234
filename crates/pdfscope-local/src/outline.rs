//! Bookmark extraction and destination resolution over a parsed `lopdf` document.
//!
//! Outline items are linked lists (`/First`, `/Next`) that malformed files can turn into cycles,
//! so every walk tracks visited objects and stops at a fixed depth.

use crate::decode_pdf_string;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pdfscope_core::{Error, RawDestination, RawOutlineNode, Result, DEFAULT_MAX_DEPTH};
use std::collections::{BTreeMap, HashMap, HashSet};

const MAX_OUTLINE_ITEMS: usize = 100_000;
const MAX_NAME_TREE_NODES: usize = 10_000;

// Outline item /F flags.
const FLAG_ITALIC: i64 = 1;
const FLAG_BOLD: i64 = 2;

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn deref_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match deref(doc, obj)? {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// The document catalog (`/Root` in the trailer).
pub(crate) fn catalog(doc: &Document) -> Option<&Dictionary> {
    deref_dict(doc, doc.trailer.get(b"Root").ok()?)
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Parse any of the PDF destination forms into a raw descriptor.
pub(crate) fn parse_destination(doc: &Document, obj: &Object) -> Option<RawDestination> {
    match deref(doc, obj)? {
        Object::Array(arr) => {
            let view = arr.get(1).and_then(|v| match v {
                Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
                _ => None,
            });
            match arr.first()? {
                Object::Reference((object, generation)) => Some(RawDestination::PageRef {
                    object: *object,
                    generation: *generation,
                    view,
                }),
                // Remote-style destinations carry a 0-based page index.
                Object::Integer(i) => u32::try_from(*i)
                    .ok()
                    .map(|index| RawDestination::PageIndex { index }),
                _ => None,
            }
        }
        Object::Name(n) => Some(RawDestination::Named {
            name: String::from_utf8_lossy(n).into_owned(),
        }),
        Object::String(s, _) => Some(RawDestination::Named {
            name: decode_pdf_string(s),
        }),
        // Named-destination values may be wrapped as `<< /D [...] >>`.
        Object::Dictionary(d) => parse_destination(doc, d.get(b"D").ok()?),
        _ => None,
    }
}

struct Walker<'a> {
    doc: &'a Document,
    visited: HashSet<ObjectId>,
    items: usize,
}

impl Walker<'_> {
    fn siblings(&mut self, first: &Object, depth: usize) -> Vec<RawOutlineNode> {
        let mut out = Vec::new();
        let mut cur = match first {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        while let Some(id) = cur {
            if !self.visited.insert(id) {
                tracing::warn!(object = ?id, "outline cycle detected; truncating");
                break;
            }
            if self.items >= MAX_OUTLINE_ITEMS {
                tracing::warn!(limit = MAX_OUTLINE_ITEMS, "outline too large; truncating");
                break;
            }
            self.items += 1;

            let doc = self.doc;
            let Ok(Object::Dictionary(dict)) = doc.get_object(id) else {
                break;
            };
            let mut node = self.node(dict);
            if depth < DEFAULT_MAX_DEPTH {
                if let Ok(child) = dict.get(b"First") {
                    node.children = self.siblings(child, depth + 1);
                }
            }
            out.push(node);
            cur = match dict.get(b"Next") {
                Ok(Object::Reference(next)) => Some(*next),
                _ => None,
            };
        }
        out
    }

    fn node(&self, dict: &Dictionary) -> RawOutlineNode {
        let title = dict
            .get(b"Title")
            .ok()
            .and_then(|t| deref(self.doc, t))
            .and_then(|t| match t {
                Object::String(s, _) => Some(decode_pdf_string(s)),
                _ => None,
            })
            .unwrap_or_default();

        let mut destination = dict
            .get(b"Dest")
            .ok()
            .and_then(|d| parse_destination(self.doc, d));
        let mut url = None;
        if let Some(action) = dict.get(b"A").ok().and_then(|a| deref_dict(self.doc, a)) {
            match action.get(b"S") {
                Ok(Object::Name(s)) if s.as_slice() == b"GoTo" => {
                    if destination.is_none() {
                        destination = action
                            .get(b"D")
                            .ok()
                            .and_then(|d| parse_destination(self.doc, d));
                    }
                }
                Ok(Object::Name(s)) if s.as_slice() == b"URI" => {
                    url = action
                        .get(b"URI")
                        .ok()
                        .and_then(|u| deref(self.doc, u))
                        .and_then(|u| match u {
                            Object::String(s, _) => Some(String::from_utf8_lossy(s).into_owned()),
                            _ => None,
                        });
                }
                _ => {}
            }
        }

        let flags = match dict.get(b"F") {
            Ok(Object::Integer(f)) => *f,
            _ => 0,
        };
        let color = match dict.get(b"C").ok().and_then(|c| deref(self.doc, c)) {
            Some(Object::Array(c)) if c.len() == 3 => {
                let mut rgb = [0u8; 3];
                for (slot, v) in rgb.iter_mut().zip(c) {
                    *slot = (number(v).unwrap_or(0.0).clamp(0.0, 1.0) * 255.0).round() as u8;
                }
                Some(rgb)
            }
            _ => None,
        };

        RawOutlineNode {
            title,
            destination,
            url,
            bold: flags & FLAG_BOLD != 0,
            italic: flags & FLAG_ITALIC != 0,
            color,
            children: Vec::new(),
        }
    }
}

/// Raw bookmark forest, or `None` when the document has none.
///
/// A damaged outline is treated as absent rather than failing the document.
pub(crate) fn read_outline(doc: &Document) -> Result<Option<Vec<RawOutlineNode>>> {
    let catalog =
        catalog(doc).ok_or_else(|| Error::Backend("missing document catalog".to_string()))?;
    let Some(outlines) = catalog
        .get(b"Outlines")
        .ok()
        .and_then(|o| deref_dict(doc, o))
    else {
        return Ok(None);
    };
    let Ok(first) = outlines.get(b"First") else {
        return Ok(None);
    };
    let mut walker = Walker {
        doc,
        visited: HashSet::new(),
        items: 0,
    };
    let nodes = walker.siblings(first, 0);
    Ok(if nodes.is_empty() { None } else { Some(nodes) })
}

/// Look up a named destination in `/Root /Dests` and the `/Root /Names /Dests` name tree.
fn lookup_named(doc: &Document, name: &str) -> Option<Object> {
    let catalog = catalog(doc)?;

    if let Some(dests) = catalog.get(b"Dests").ok().and_then(|d| deref_dict(doc, d)) {
        if let Ok(v) = dests.get(name.as_bytes()) {
            return Some(v.clone());
        }
    }

    let names = catalog.get(b"Names").ok().and_then(|n| deref_dict(doc, n))?;
    let root = names.get(b"Dests").ok()?;
    let mut stack = vec![root];
    let mut seen = 0usize;
    while let Some(node) = stack.pop() {
        seen += 1;
        if seen > MAX_NAME_TREE_NODES {
            break;
        }
        let Some(dict) = deref_dict(doc, node) else {
            continue;
        };
        if let Ok(Object::Array(pairs)) = dict.get(b"Names").map(|n| deref(doc, n).unwrap_or(n)) {
            for kv in pairs.chunks(2) {
                if let [Object::String(key, _), value] = kv {
                    if decode_pdf_string(key) == name {
                        return Some(value.clone());
                    }
                }
            }
        }
        if let Ok(Object::Array(kids)) = dict.get(b"Kids") {
            stack.extend(kids.iter());
        }
    }
    None
}

/// Page-tree index used to turn raw destinations into 1-based page numbers.
#[derive(Debug, Clone)]
pub(crate) struct PageIndex {
    count: u32,
    by_object: HashMap<ObjectId, u32>,
}

impl PageIndex {
    pub(crate) fn new(pages: &BTreeMap<u32, ObjectId>) -> Self {
        Self {
            count: pages.len() as u32,
            by_object: pages.iter().map(|(n, id)| (*id, *n)).collect(),
        }
    }

    pub(crate) fn resolve(&self, doc: &Document, dest: &RawDestination) -> Result<u32> {
        let unresolved = || Error::Destination(format!("{dest:?}"));
        match dest {
            RawDestination::PageIndex { index } => index
                .checked_add(1)
                .filter(|page| *page <= self.count)
                .ok_or_else(unresolved),
            RawDestination::PageRef {
                object, generation, ..
            } => self
                .by_object
                .get(&(*object, *generation))
                .copied()
                .ok_or_else(unresolved),
            RawDestination::Named { name } => {
                let target = lookup_named(doc, name).ok_or_else(unresolved)?;
                match parse_destination(doc, &target) {
                    // One level of indirection only: a name pointing at a name is malformed.
                    Some(d @ (RawDestination::PageRef { .. } | RawDestination::PageIndex { .. })) => {
                        self.resolve(doc, &d)
                    }
                    _ => Err(unresolved()),
                }
            }
        }
    }
}
