use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod matcher;
pub mod outline;
pub mod pattern;
pub mod range;
pub mod search;

pub use matcher::{Match, Matcher, MAX_MATCHES_PER_PAGE};
pub use outline::{
    normalize, OutlineNode, OutlineOptions, OutlineResult, OutlineSummary, DEFAULT_MAX_DEPTH,
};
pub use pattern::{compile, CompiledPattern};
pub use range::{resolve, PageSet, RangeSegment};
pub use search::{
    extract_page, search, MatchSnippet, PageSearchResult, SearchEnvelope, SearchRequest,
    StopReason, Strategy,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid page range: {0}")]
    InvalidRange(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("search timed out after {timeout_ms}ms")]
    SearchTimeout { timeout_ms: u64 },
    #[error("too many matches (more than {limit})")]
    ExcessiveMatches { limit: usize },
    #[error("cannot open document: {0}")]
    Open(String),
    #[error("backend failed: {0}")]
    Backend(String),
    #[error("page {page}: {message}")]
    PageText { page: u32, message: String },
    #[error("destination not resolved: {0}")]
    Destination(String),
}

impl Error {
    /// Per-unit failures that are recorded next to partial results instead of aborting a query.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SearchTimeout { .. }
                | Self::ExcessiveMatches { .. }
                | Self::PageText { .. }
                | Self::Destination(_)
        )
    }

    /// Input problems the caller can fix by changing arguments.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange(_) | Self::InvalidPattern(_) | Self::InvalidParams(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A raw bookmark target, as reported by the backend before page resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawDestination {
    /// 0-based page index (already resolved by the backend's parser).
    PageIndex { index: u32 },
    /// Indirect reference to a page object.
    PageRef {
        object: u32,
        generation: u16,
        /// Destination view name, e.g. `XYZ` or `Fit`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        view: Option<String>,
    },
    /// Named destination, looked up in the document's name dictionaries.
    Named { name: String },
}

/// One bookmark node as the backend sees it. Owned tree: cycles are the backend's problem.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawOutlineNode {
    pub title: String,
    #[serde(default)]
    pub destination: Option<RawDestination>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    /// RGB, 0-255.
    #[serde(default)]
    pub color: Option<[u8; 3]>,
    #[serde(default)]
    pub children: Vec<RawOutlineNode>,
}

/// Maps a raw destination to a 1-based page number.
pub trait DestinationResolver: Send + Sync {
    fn resolve_page(&self, dest: &RawDestination) -> Result<u32>;
}

/// Resolver for callers without a page tree: only direct page indices resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOnlyResolver;

impl DestinationResolver for IndexOnlyResolver {
    fn resolve_page(&self, dest: &RawDestination) -> Result<u32> {
        match dest {
            RawDestination::PageIndex { index } => index
                .checked_add(1)
                .ok_or_else(|| Error::Destination(format!("{dest:?}"))),
            other => Err(Error::Destination(format!("{other:?}"))),
        }
    }
}

/// The narrow "document backend" surface the core calls through.
///
/// Implementations must keep diagnostics off stdout: page text is produced without side-channel
/// output, and any parser chatter goes to the log channel.
#[async_trait::async_trait]
pub trait DocumentBackend: Send + Sync {
    fn page_count(&self) -> Result<u32>;

    /// Text of one 1-based page. Pages without a text layer yield `""`, not an error.
    async fn page_text(&self, page: u32) -> Result<String>;

    /// `None` when the document has no bookmarks.
    async fn raw_outline(&self) -> Result<Option<Vec<RawOutlineNode>>>;

    fn resolver(&self) -> &dyn DestinationResolver;
}

/// Per-call limits applied around backend calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLimits {
    /// Wall-clock bound on one `page_text` call.
    pub page_text_timeout_ms: u64,
}

impl CallLimits {
    pub fn page_text_timeout(&self) -> Duration {
        Duration::from_millis(self.page_text_timeout_ms)
    }
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            page_text_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes_follow_taxonomy() {
        assert!(Error::InvalidRange("x".into()).is_validation());
        assert!(Error::InvalidPattern("x".into()).is_validation());
        assert!(!Error::Open("x".into()).is_validation());
        assert!(Error::SearchTimeout { timeout_ms: 1000 }.is_recoverable());
        assert!(Error::ExcessiveMatches { limit: 10 }.is_recoverable());
        assert!(!Error::Backend("gone".into()).is_recoverable());
    }

    #[test]
    fn timeout_message_names_the_limit() {
        let e = Error::SearchTimeout { timeout_ms: 5000 };
        assert_eq!(e.to_string(), "search timed out after 5000ms");
    }

    #[test]
    fn index_only_resolver_is_one_based() {
        let r = IndexOnlyResolver;
        assert_eq!(
            r.resolve_page(&RawDestination::PageIndex { index: 0 }),
            Ok(1)
        );
        assert!(r
            .resolve_page(&RawDestination::Named {
                name: "intro".into()
            })
            .is_err());
        assert!(r
            .resolve_page(&RawDestination::PageIndex { index: u32::MAX })
            .is_err());
    }

    #[test]
    fn raw_destination_serializes_tagged() {
        let v = serde_json::to_value(RawDestination::PageRef {
            object: 12,
            generation: 0,
            view: Some("XYZ".into()),
        })
        .unwrap();
        assert_eq!(v["kind"], "page_ref");
        assert_eq!(v["object"], 12);
        assert_eq!(v["view"], "XYZ");
    }
}
