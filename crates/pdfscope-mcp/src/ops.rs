//! The operations behind both the MCP tools and the CLI subcommands.
//!
//! Every operation returns a complete JSON envelope: domain failures become `{ok:false, error}`
//! payloads that echo the request, never transport errors.

use crate::config::ServerConfig;
use crate::envelope::{add_envelope_fields, error_payload, SCHEMA_VERSION};
use pdfscope_core::search::{DEFAULT_CONTEXT_CHARS, DEFAULT_TIMEOUT_MS};
use pdfscope_core::{
    compile, normalize, resolve, DocumentBackend, Error, OutlineOptions, PageSet, Result,
    SearchRequest,
};
use pdfscope_local::{shellout, LocalDocument};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub(crate) struct InfoArgs {
    /// Path to a local PDF file.
    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub(crate) struct ResolvePagesArgs {
    /// Path to a local PDF file; its page count bounds the range. Takes precedence over total_pages.
    #[arg(long)]
    pub path: Option<String>,
    /// Page count to resolve against when no path is given.
    #[arg(long)]
    pub total_pages: Option<u32>,
    /// Range expression, e.g. "1:5,8,10:" (1-based, inclusive; open ends allowed).
    #[arg(long)]
    pub pages: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub(crate) struct ReadPagesArgs {
    /// Path to a local PDF file.
    #[arg(long)]
    pub path: Option<String>,
    /// Range expression (default: all pages).
    #[arg(long)]
    pub pages: Option<String>,
    /// Maximum characters returned per page (default and ceiling: PDFSCOPE_MAX_READ_CHARS).
    #[arg(long)]
    pub max_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub(crate) struct SearchArgs {
    /// Path to a local PDF file.
    #[arg(long)]
    pub path: Option<String>,
    /// Plain text (case-insensitive literal) or /regex/flags with flags from g,i,m,s,u,x.
    #[arg(long)]
    pub pattern: Option<String>,
    /// Range expression (default: all pages).
    #[arg(long)]
    pub pages: Option<String>,
    /// Characters of context on each side of a match (10-1000, default 50).
    #[arg(long)]
    pub context_chars: Option<usize>,
    /// Per-page scan timeout in milliseconds (1000-60000, default 5000).
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Stop once this many matches have been found (switches to early stopping).
    #[arg(long)]
    pub max_results: Option<usize>,
    /// Stop after scanning this many pages (switches to early stopping).
    #[arg(long)]
    pub max_pages_scanned: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub(crate) struct OutlineArgs {
    /// Path to a local PDF file.
    #[arg(long)]
    pub path: Option<String>,
    /// Include each bookmark's raw destination descriptor.
    #[arg(long)]
    pub include_destinations: Option<bool>,
    /// Maximum nesting depth to return (1-10). Deeper bookmarks are dropped.
    #[arg(long)]
    pub max_depth: Option<usize>,
    /// Return a pre-order list with levels instead of a tree.
    #[arg(long)]
    pub flatten: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub(crate) struct ValidatePatternArgs {
    /// Pattern to compile, as passed to search.
    #[arg(long)]
    pub pattern: Option<String>,
}

fn required<'a>(v: &'a Option<String>, name: &str) -> Result<&'a str> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidParams(format!("{name} is required")))
}

/// Patterns are matched verbatim, surrounding whitespace included.
fn pattern_arg(v: &Option<String>) -> Result<&str> {
    v.as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidParams("pattern is required".to_string()))
}

fn to_json<T: Serialize>(v: &T) -> Result<serde_json::Value> {
    serde_json::to_value(v).map_err(|e| Error::Backend(format!("serialize: {e}")))
}

fn page_set(expression: Option<&str>, total_pages: u32) -> Result<PageSet> {
    match expression.map(str::trim).filter(|s| !s.is_empty()) {
        Some(expr) => resolve(expr, total_pages),
        None => Ok(PageSet::all(total_pages)),
    }
}

async fn open(cfg: &ServerConfig, path: &Option<String>) -> Result<LocalDocument> {
    LocalDocument::open(required(path, "path")?, &cfg.backend).await
}

fn finish<T: Serialize>(
    kind: &str,
    t0: Instant,
    args: &T,
    r: Result<serde_json::Value>,
) -> serde_json::Value {
    let request = serde_json::to_value(args).unwrap_or(serde_json::Value::Null);
    let mut payload = match r {
        Ok(mut v) => {
            v["ok"] = serde_json::json!(true);
            v["request"] = request;
            v
        }
        Err(e) => {
            tracing::debug!(kind, error = %e, "operation failed");
            error_payload(&e, request)
        }
    };
    add_envelope_fields(&mut payload, kind, t0.elapsed().as_millis());
    payload
}

pub(crate) fn meta(cfg: &ServerConfig) -> serde_json::Value {
    let t0 = Instant::now();
    let payload = serde_json::json!({
        "name": "pdfscope",
        "version": env!("CARGO_PKG_VERSION"),
        "schema_version": SCHEMA_VERSION,
        "text_engine": cfg.backend.engine.as_str(),
        "local_tools": {
            "pdftotext": shellout::has("pdftotext"),
        },
        "limits": {
            "max_file_bytes": cfg.backend.max_file_bytes,
            "page_text_timeout_ms": cfg.limits.page_text_timeout_ms,
            "max_read_chars": cfg.max_read_chars,
        },
        "defaults": {
            "context_chars": DEFAULT_CONTEXT_CHARS,
            "timeout_ms": DEFAULT_TIMEOUT_MS,
        },
    });
    finish("pdfscope_meta", t0, &serde_json::Value::Null, Ok(payload))
}

pub(crate) async fn info(cfg: &ServerConfig, args: InfoArgs) -> serde_json::Value {
    let t0 = Instant::now();
    let r: Result<serde_json::Value> = async {
        let doc = open(cfg, &args.path).await?;
        to_json(&doc.info()?)
    }
    .await;
    finish("pdf_info", t0, &args, r)
}

pub(crate) async fn resolve_pages(cfg: &ServerConfig, args: ResolvePagesArgs) -> serde_json::Value {
    let t0 = Instant::now();
    let r: Result<serde_json::Value> = async {
        let expr = required(&args.pages, "pages")?;
        let total_pages = match (&args.path, args.total_pages) {
            (Some(_), _) => open(cfg, &args.path).await?.page_count()?,
            (None, Some(n)) => n,
            (None, None) => {
                return Err(Error::InvalidParams(
                    "either path or total_pages is required".to_string(),
                ))
            }
        };
        let pages = resolve(expr, total_pages)?;
        Ok(serde_json::json!({
            "total_pages": total_pages,
            "page_count": pages.len(),
            "pages": pages,
        }))
    }
    .await;
    finish("pdf_resolve_pages", t0, &args, r)
}

pub(crate) async fn read_pages(cfg: &ServerConfig, args: ReadPagesArgs) -> serde_json::Value {
    let t0 = Instant::now();
    let r: Result<serde_json::Value> = async {
        let max_chars = match args.max_chars {
            Some(0) => return Err(Error::InvalidParams("max_chars must be >= 1".to_string())),
            Some(n) => n.min(cfg.max_read_chars),
            None => cfg.max_read_chars,
        };
        let doc = open(cfg, &args.path).await?;
        let pages = page_set(args.pages.as_deref(), doc.page_count()?)?;

        let mut out = Vec::with_capacity(pages.len());
        let mut errors = Vec::new();
        for page in pages.iter() {
            match pdfscope_core::extract_page(&doc, page, &cfg.limits).await {
                Ok(text) => {
                    let chars = text.chars().count();
                    let text: String = text.chars().take(max_chars).collect();
                    out.push(serde_json::json!({
                        "page": page,
                        "chars": chars,
                        "truncated": chars > max_chars,
                        "text": text,
                    }));
                }
                Err(msg) => {
                    tracing::warn!(page, error = %msg, "page text unavailable");
                    errors.push(msg);
                }
            }
        }
        Ok(serde_json::json!({
            "pages_requested": pages.len(),
            "max_chars": max_chars,
            "pages": out,
            "errors": errors,
        }))
    }
    .await;
    finish("pdf_read_pages", t0, &args, r)
}

pub(crate) async fn search(cfg: &ServerConfig, args: SearchArgs) -> serde_json::Value {
    let t0 = Instant::now();
    let r: Result<serde_json::Value> = async {
        let mut req = SearchRequest::new(pattern_arg(&args.pattern)?);
        if let Some(n) = args.context_chars {
            req.context_chars = n;
        }
        if let Some(ms) = args.timeout_ms {
            req.timeout_per_page_ms = ms;
        }
        req.max_results = args.max_results;
        req.max_pages_scanned = args.max_pages_scanned;
        // Reject bad arguments before the document is even opened.
        req.validate()?;
        compile(&req.pattern)?;

        let doc = open(cfg, &args.path).await?;
        let pages = page_set(args.pages.as_deref(), doc.page_count()?)?;
        let envelope = pdfscope_core::search(&doc, &pages, &req, &cfg.limits).await?;
        to_json(&envelope)
    }
    .await;
    finish("pdf_search", t0, &args, r)
}

pub(crate) async fn outline(cfg: &ServerConfig, args: OutlineArgs) -> serde_json::Value {
    let t0 = Instant::now();
    let r: Result<serde_json::Value> = async {
        let opts = OutlineOptions {
            include_destinations: args.include_destinations.unwrap_or(false),
            max_depth: args.max_depth,
            flatten: args.flatten.unwrap_or(false),
        };
        opts.validate()?;
        let doc = open(cfg, &args.path).await?;
        let raw = doc.raw_outline().await?;
        to_json(&normalize(raw.as_deref(), &opts, doc.resolver())?)
    }
    .await;
    finish("pdf_outline", t0, &args, r)
}

pub(crate) fn validate_pattern(args: ValidatePatternArgs) -> serde_json::Value {
    let t0 = Instant::now();
    let r: Result<serde_json::Value> = (|| {
        let compiled = compile(pattern_arg(&args.pattern)?)?;
        Ok(serde_json::json!({
            "is_regex": compiled.is_regex(),
            "match_all": compiled.match_all(),
            "compiled": to_json(&compiled)?,
        }))
    })();
    finish("pdf_validate_pattern", t0, &args, r)
}
