//! Small synthetic PDFs built with `lopdf`, for tests and smoke checks.
//!
//! Every page gets one line of Courier text; bookmarks can target pages directly, through a
//! named destination, or carry a URI action.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use pdfscope_core::{Error, Result};

#[derive(Debug, Clone)]
enum Target {
    Page(u32),
    Named { name: String, page: u32 },
    Uri(String),
}

#[derive(Debug, Clone)]
pub struct Bookmark {
    title: String,
    target: Target,
    bold: bool,
    italic: bool,
    color: Option<[f32; 3]>,
    children: Vec<Bookmark>,
}

impl Bookmark {
    fn with_target(title: &str, target: Target) -> Self {
        Self {
            title: title.to_string(),
            target,
            bold: false,
            italic: false,
            color: None,
            children: Vec::new(),
        }
    }

    /// Explicit `[page /Fit]` destination; `page` is 1-based.
    pub fn to_page(title: &str, page: u32) -> Self {
        Self::with_target(title, Target::Page(page))
    }

    /// Destination by name, registered in the catalog's `/Dests`.
    pub fn named(title: &str, name: &str, page: u32) -> Self {
        Self::with_target(
            title,
            Target::Named {
                name: name.to_string(),
                page,
            },
        )
    }

    pub fn link(title: &str, url: &str) -> Self {
        Self::with_target(title, Target::Uri(url.to_string()))
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn color(mut self, rgb: [f32; 3]) -> Self {
        self.color = Some(rgb);
        self
    }

    pub fn child(mut self, child: Bookmark) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixtureDoc {
    pages: Vec<String>,
    bookmarks: Vec<Bookmark>,
    title: Option<String>,
    cyclic: bool,
}

impl FixtureDoc {
    /// One page per entry; an empty string yields a page with no text layer.
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn bookmark(mut self, b: Bookmark) -> Self {
        self.bookmarks.push(b);
        self
    }

    /// `/Title` in the document information dictionary.
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Link the last top-level bookmark back to the first (a malformed outline).
    pub fn cyclic(mut self) -> Self {
        self.cyclic = true;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut page_ids = Vec::with_capacity(self.pages.len());
        for text in &self.pages {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(text.as_str())]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations }
                .encode()
                .map_err(|e| Error::Backend(format!("fixture content: {e}")))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            });
            page_ids.push(page_id);
        }

        let kids: Vec<Object> = page_ids.iter().map(|id| (*id).into()).collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_ids.len() as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        };

        if !self.bookmarks.is_empty() {
            let outlines_id = doc.new_object_id();
            let mut dests = Dictionary::new();
            let (first, last, count) =
                add_items(&mut doc, &self.bookmarks, outlines_id, &page_ids, &mut dests)?;
            if self.cyclic {
                if let Ok(Object::Dictionary(d)) = doc.get_object_mut(last) {
                    d.set("Next", first);
                }
            }
            doc.objects.insert(
                outlines_id,
                Object::Dictionary(dictionary! {
                    "Type" => "Outlines",
                    "First" => first,
                    "Last" => last,
                    "Count" => count,
                }),
            );
            catalog.set("Outlines", outlines_id);
            if !dests.is_empty() {
                let dests_id = doc.add_object(dests);
                catalog.set("Dests", dests_id);
            }
        }

        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);
        if let Some(title) = &self.title {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal(title.as_str()),
                "Producer" => Object::string_literal("pdfscope fixture"),
            });
            doc.trailer.set("Info", info_id);
        }

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| Error::Backend(format!("fixture save: {e}")))?;
        Ok(out)
    }
}

fn page_dest(page_ids: &[ObjectId], page: u32) -> Result<Object> {
    let id = page_ids
        .get((page as usize).wrapping_sub(1))
        .ok_or_else(|| Error::Backend(format!("fixture bookmark targets missing page {page}")))?;
    Ok(Object::Array(vec![(*id).into(), "Fit".into()]))
}

/// Emit one sibling list; returns `(first, last, count)` for the parent's links.
fn add_items(
    doc: &mut Document,
    items: &[Bookmark],
    parent: ObjectId,
    page_ids: &[ObjectId],
    dests: &mut Dictionary,
) -> Result<(ObjectId, ObjectId, i64)> {
    let ids: Vec<ObjectId> = items.iter().map(|_| doc.new_object_id()).collect();
    let mut count = 0i64;
    for (i, b) in items.iter().enumerate() {
        let mut d = dictionary! {
            "Title" => Object::string_literal(b.title.as_str()),
            "Parent" => parent,
        };
        if i > 0 {
            d.set("Prev", ids[i - 1]);
        }
        if let Some(next) = ids.get(i + 1) {
            d.set("Next", *next);
        }
        match &b.target {
            Target::Page(p) => {
                d.set("Dest", page_dest(page_ids, *p)?);
            }
            Target::Named { name, page } => {
                dests.set(name.as_bytes().to_vec(), page_dest(page_ids, *page)?);
                d.set("Dest", Object::Name(name.as_bytes().to_vec()));
            }
            Target::Uri(url) => {
                let action = dictionary! {
                    "S" => "URI",
                    "URI" => Object::string_literal(url.as_str()),
                };
                d.set("A", action);
            }
        }
        let flags = i64::from(b.italic) | (i64::from(b.bold) << 1);
        if flags != 0 {
            d.set("F", flags);
        }
        if let Some([r, g, bl]) = b.color {
            d.set("C", vec![r.into(), g.into(), bl.into()]);
        }
        count += 1;
        if !b.children.is_empty() {
            let (first, last, n) = add_items(doc, &b.children, ids[i], page_ids, dests)?;
            d.set("First", first);
            d.set("Last", last);
            d.set("Count", n);
            count += n;
        }
        doc.objects.insert(ids[i], Object::Dictionary(d));
    }
    match (ids.first(), ids.last()) {
        (Some(first), Some(last)) => Ok((*first, *last, count)),
        _ => Err(Error::Backend("fixture outline level is empty".to_string())),
    }
}
