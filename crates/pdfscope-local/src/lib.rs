use lopdf::{Document, Object, ObjectId};
use pdfscope_core::{
    DestinationResolver, DocumentBackend, Error, RawDestination, RawOutlineNode, Result,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
mod outline;
pub mod shellout;

use outline::PageIndex;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Which engine produces page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEngine {
    /// `lopdf`, falling back to `pdf-extract` when a page fails.
    Auto,
    Lopdf,
    PdfExtract,
    Pdftotext,
}

impl TextEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Lopdf => "lopdf",
            Self::PdfExtract => "pdf-extract",
            Self::Pdftotext => "pdftotext",
        }
    }
}

impl FromStr for TextEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "lopdf" => Ok(Self::Lopdf),
            "pdf-extract" | "pdf_extract" => Ok(Self::PdfExtract),
            "pdftotext" => Ok(Self::Pdftotext),
            other => Err(Error::InvalidParams(format!(
                "unknown text engine {other:?} (allowed: auto, lopdf, pdf-extract, pdftotext)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendConfig {
    pub engine: TextEngine,
    pub max_file_bytes: u64,
    pub shellout_timeout_ms: u64,
    /// Cap on bytes read from a shellout per page.
    pub shellout_max_bytes: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            engine: TextEngine::Auto,
            max_file_bytes: 256 * 1024 * 1024,
            shellout_timeout_ms: 20_000,
            shellout_max_bytes: 4 * 1024 * 1024,
        }
    }
}

impl BackendConfig {
    /// Read `PDFSCOPE_*` variables; unset or unparsable values keep defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let engine = match env("PDFSCOPE_TEXT_ENGINE").map(|s| s.parse::<TextEngine>()) {
            Some(Ok(e)) => e,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring PDFSCOPE_TEXT_ENGINE");
                d.engine
            }
            None => d.engine,
        };
        Self {
            engine,
            max_file_bytes: env_u64("PDFSCOPE_MAX_FILE_BYTES", d.max_file_bytes).max(1),
            shellout_timeout_ms: env_u64("PDFSCOPE_SHELLOUT_TIMEOUT_MS", d.shellout_timeout_ms)
                .clamp(50, 300_000),
            shellout_max_bytes: d.shellout_max_bytes,
        }
    }
}

/// Best-effort sniff for PDF bytes (magic header).
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Decode a PDF text string: UTF-16BE or UTF-8 with BOM, else PDFDocEncoding (Latin-1 subset).
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub path: String,
    pub file_bytes: u64,
    pub sha256: String,
    pub pdf_version: String,
    pub page_count: u32,
    pub encrypted: bool,
    pub has_outline: bool,
    pub metadata: BTreeMap<String, String>,
}

const INFO_KEYS: [&str; 8] = [
    "Title",
    "Author",
    "Subject",
    "Keywords",
    "Creator",
    "Producer",
    "CreationDate",
    "ModDate",
];

struct Inner {
    path: PathBuf,
    bytes: Vec<u8>,
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
    index: PageIndex,
    cfg: BackendConfig,
    // Engines that work on the whole file are run once per opened document.
    pdf_extract_pages: OnceLock<std::result::Result<Vec<String>, String>>,
    temp_copy: OnceLock<std::result::Result<tempfile::NamedTempFile, &'static str>>,
}

impl Inner {
    fn lopdf_text(&self, page: u32) -> Result<String> {
        self.doc.extract_text(&[page]).map_err(|e| Error::PageText {
            page,
            message: format!("lopdf: {e}"),
        })
    }

    fn pdf_extract_text(&self, page: u32) -> Result<String> {
        let pages = self.pdf_extract_pages.get_or_init(|| {
            pdf_extract::extract_text_from_mem_by_pages(&self.bytes).map_err(|e| e.to_string())
        });
        match pages {
            Ok(pages) => Ok(pages
                .get((page - 1) as usize)
                .cloned()
                .unwrap_or_default()),
            Err(e) => Err(Error::PageText {
                page,
                message: format!("pdf-extract: {e}"),
            }),
        }
    }

    fn pdftotext_text(&self, page: u32) -> Result<String> {
        let fail = |why: &str| Error::PageText {
            page,
            message: format!("pdftotext: {why}"),
        };
        let tmp = self
            .temp_copy
            .get_or_init(|| shellout::write_temp_file(&self.bytes, ".pdf"));
        let tmp = tmp.as_ref().map_err(|e| fail(e))?;
        shellout::pdftotext_page(
            tmp.path(),
            page,
            Duration::from_millis(self.cfg.shellout_timeout_ms),
            self.cfg.shellout_max_bytes,
        )
        .map_err(fail)
    }

    fn page_text_blocking(&self, page: u32) -> Result<String> {
        if !self.pages.contains_key(&page) {
            return Err(Error::PageText {
                page,
                message: format!("no such page (document has {})", self.pages.len()),
            });
        }
        match self.cfg.engine {
            TextEngine::Lopdf => self.lopdf_text(page),
            TextEngine::PdfExtract => self.pdf_extract_text(page),
            TextEngine::Pdftotext => self.pdftotext_text(page),
            TextEngine::Auto => self.lopdf_text(page).or_else(|e| {
                tracing::debug!(page, error = %e, "lopdf failed; falling back to pdf-extract");
                self.pdf_extract_text(page)
            }),
        }
    }
}

impl DestinationResolver for Inner {
    fn resolve_page(&self, dest: &RawDestination) -> Result<u32> {
        self.index.resolve(&self.doc, dest)
    }
}

/// A PDF opened from the local filesystem.
#[derive(Clone)]
pub struct LocalDocument {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LocalDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDocument")
            .field("path", &self.inner.path)
            .field("pages", &self.inner.pages.len())
            .field("engine", &self.inner.cfg.engine)
            .finish()
    }
}

impl LocalDocument {
    /// Read and parse `path`. Every failure here is fatal for the query.
    pub async fn open(path: impl AsRef<Path>, cfg: &BackendConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::Open(format!("{}: {e}", path.display())))?;
        if !meta.is_file() {
            return Err(Error::Open(format!("{}: not a regular file", path.display())));
        }
        if meta.len() > cfg.max_file_bytes {
            return Err(Error::Open(format!(
                "{}: file is {} bytes, larger than the {} byte limit (PDFSCOPE_MAX_FILE_BYTES)",
                path.display(),
                meta.len(),
                cfg.max_file_bytes
            )));
        }
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Open(format!("{}: {e}", path.display())))?;
        let cfg = cfg.clone();
        tokio::task::spawn_blocking(move || Self::from_bytes(path, bytes, cfg))
            .await
            .map_err(|e| Error::Backend(format!("parse task failed: {e}")))?
    }

    /// Parse in-memory bytes; `path` is only used as a label.
    pub fn from_bytes(path: PathBuf, bytes: Vec<u8>, cfg: BackendConfig) -> Result<Self> {
        if !bytes_look_like_pdf(&bytes) {
            return Err(Error::Open(format!(
                "{}: not a PDF (missing %PDF- header)",
                path.display()
            )));
        }
        let doc = Document::load_mem(&bytes)
            .map_err(|e| Error::Open(format!("{}: {e}", path.display())))?;
        let pages = doc.get_pages();
        let index = PageIndex::new(&pages);
        tracing::debug!(path = %path.display(), pages = pages.len(), engine = cfg.engine.as_str(), "document opened");
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                bytes,
                doc,
                pages,
                index,
                cfg,
                pdf_extract_pages: OnceLock::new(),
                temp_copy: OnceLock::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn engine(&self) -> TextEngine {
        self.inner.cfg.engine
    }

    pub fn info(&self) -> Result<DocumentInfo> {
        let inner = &self.inner;
        let mut metadata = BTreeMap::new();
        if let Ok(info) = inner.doc.trailer.get(b"Info") {
            let dict = match info {
                Object::Reference(id) => inner.doc.get_object(*id).ok(),
                other => Some(other),
            };
            if let Some(Object::Dictionary(dict)) = dict {
                for key in INFO_KEYS {
                    if let Ok(Object::String(s, _)) = dict.get(key.as_bytes()) {
                        let v = decode_pdf_string(s);
                        if !v.trim().is_empty() {
                            metadata.insert(key.to_ascii_lowercase(), v);
                        }
                    }
                }
            }
        }
        Ok(DocumentInfo {
            path: inner.path.display().to_string(),
            file_bytes: inner.bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(&inner.bytes)),
            pdf_version: inner.doc.version.clone(),
            page_count: inner.pages.len() as u32,
            encrypted: inner.doc.trailer.get(b"Encrypt").is_ok(),
            has_outline: match outline::read_outline(&inner.doc) {
                Ok(items) => items.is_some(),
                Err(e) => {
                    tracing::debug!(error = %e, "outline unreadable; reporting none");
                    false
                }
            },
            metadata,
        })
    }
}

#[async_trait::async_trait]
impl DocumentBackend for LocalDocument {
    fn page_count(&self) -> Result<u32> {
        Ok(self.inner.pages.len() as u32)
    }

    async fn page_text(&self, page: u32) -> Result<String> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.page_text_blocking(page))
            .await
            .map_err(|e| Error::PageText {
                page,
                message: format!("extraction task failed: {e}"),
            })?
    }

    async fn raw_outline(&self) -> Result<Option<Vec<RawOutlineNode>>> {
        outline::read_outline(&self.inner.doc)
    }

    fn resolver(&self) -> &dyn DestinationResolver {
        self.inner.as_ref()
    }
}
