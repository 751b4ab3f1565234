//! Pattern search over a [`PageSet`].
//!
//! Two strategies share one accumulator:
//! - exhaustive: extract every page first, then scan them all (`completed` is always true);
//! - early-stopping: extract and scan page by page, stopping on a page or result ceiling.
//!
//! Per-page failures land in `errors` and never abort the remaining pages.

use crate::matcher::{Match, Matcher};
use crate::pattern::compile;
use crate::range::PageSet;
use crate::{CallLimits, DocumentBackend, Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONTEXT_CHARS: usize = 50;
pub const CONTEXT_CHARS_RANGE: RangeInclusive<usize> = 10..=1000;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const TIMEOUT_MS_RANGE: RangeInclusive<u64> = 1_000..=60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub pattern: String,
    pub context_chars: usize,
    pub timeout_per_page_ms: u64,
    pub max_results: Option<usize>,
    pub max_pages_scanned: Option<usize>,
}

impl SearchRequest {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            context_chars: DEFAULT_CONTEXT_CHARS,
            timeout_per_page_ms: DEFAULT_TIMEOUT_MS,
            max_results: None,
            max_pages_scanned: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !CONTEXT_CHARS_RANGE.contains(&self.context_chars) {
            return Err(Error::InvalidParams(format!(
                "context_chars must be in {}..={} (got {})",
                CONTEXT_CHARS_RANGE.start(),
                CONTEXT_CHARS_RANGE.end(),
                self.context_chars
            )));
        }
        if !TIMEOUT_MS_RANGE.contains(&self.timeout_per_page_ms) {
            return Err(Error::InvalidParams(format!(
                "timeout_ms must be in {}..={} (got {})",
                TIMEOUT_MS_RANGE.start(),
                TIMEOUT_MS_RANGE.end(),
                self.timeout_per_page_ms
            )));
        }
        if self.max_results == Some(0) {
            return Err(Error::InvalidParams("max_results must be >= 1".to_string()));
        }
        if self.max_pages_scanned == Some(0) {
            return Err(Error::InvalidParams(
                "max_pages_scanned must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Either limit switches to early stopping.
    pub fn strategy(&self) -> Strategy {
        if self.max_results.is_none() && self.max_pages_scanned.is_none() {
            Strategy::Exhaustive
        } else {
            Strategy::EarlyStopping
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Exhaustive,
    EarlyStopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    MaxResults,
    MaxPages,
}

/// A window of page text around one match. Offsets are in chars, relative to `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnippet {
    pub text: String,
    pub match_start: usize,
    pub match_end: usize,
    /// Char offset of the match within the whole page.
    pub page_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSearchResult {
    pub page: u32,
    pub match_count: usize,
    pub matches: Vec<MatchSnippet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEnvelope {
    pub pattern: String,
    pub is_regex: bool,
    pub strategy: Strategy,
    pub pages_requested: usize,
    pub pages_scanned: usize,
    pub pages_with_matches: usize,
    pub total_matches: usize,
    pub completed: bool,
    pub stopped_reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages_scanned: Option<usize>,
    pub results: Vec<PageSearchResult>,
    pub errors: Vec<String>,
}

/// Char-window snippets for sorted matches, walking the text once.
fn snippets(text: &str, matches: &[Match], context: usize) -> Vec<MatchSnippet> {
    let mut out = Vec::with_capacity(matches.len());
    let (mut byte_at, mut char_at) = (0usize, 0usize);
    for m in matches {
        char_at += text[byte_at..m.start].chars().count();
        byte_at = m.start;

        let win_start = text[..m.start]
            .char_indices()
            .rev()
            .take(context)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(m.start);
        let win_end = text[m.end..]
            .char_indices()
            .nth(context)
            .map(|(i, _)| m.end + i)
            .unwrap_or(text.len());

        let match_start = text[win_start..m.start].chars().count();
        let match_len = text[m.start..m.end].chars().count();
        out.push(MatchSnippet {
            text: text[win_start..win_end].to_string(),
            match_start,
            match_end: match_start + match_len,
            page_offset: char_at,
        });
    }
    out
}

/// One page's text under the outer per-call bound; failures come back as `"Page N: ..."` lines.
pub async fn extract_page<B: DocumentBackend + ?Sized>(
    backend: &B,
    page: u32,
    limits: &CallLimits,
) -> std::result::Result<String, String> {
    match tokio::time::timeout(limits.page_text_timeout(), backend.page_text(page)).await {
        Err(_) => Err(format!(
            "Page {page}: text extraction timed out after {}ms",
            limits.page_text_timeout_ms
        )),
        Ok(Err(e)) => Err(format!("Page {page}: text extraction failed: {e}")),
        Ok(Ok(t)) => Ok(t),
    }
}

struct Accumulator<'a> {
    matcher: &'a Matcher,
    context_chars: usize,
    timeout: Duration,
    pages_scanned: usize,
    total_matches: usize,
    results: Vec<PageSearchResult>,
    errors: Vec<String>,
}

impl Accumulator<'_> {
    async fn scan_page(&mut self, page: u32, text: std::result::Result<String, String>) {
        self.pages_scanned += 1;
        let text = match text {
            Ok(t) if t.trim().is_empty() => {
                self.errors.push(format!("Page {page}: no extractable text"));
                return;
            }
            Ok(t) => t,
            Err(msg) => {
                tracing::warn!(page, error = %msg, "page text unavailable");
                self.errors.push(msg);
                return;
            }
        };
        let text: Arc<str> = Arc::from(text);
        match self.matcher.scan(Arc::clone(&text), self.timeout).await {
            Ok(hits) if hits.is_empty() => {}
            Ok(hits) => {
                self.total_matches += hits.len();
                self.results.push(PageSearchResult {
                    page,
                    match_count: hits.len(),
                    matches: snippets(&text, &hits, self.context_chars),
                });
            }
            Err(e) => {
                tracing::warn!(page, error = %e, "page scan failed");
                self.errors.push(format!("Page {page}: {e}"));
            }
        }
    }
}

/// Search `pages` of `backend` for `req.pattern`.
///
/// Validation (parameters, pattern) happens before any page is touched.
pub async fn search<B: DocumentBackend + ?Sized>(
    backend: &B,
    pages: &PageSet,
    req: &SearchRequest,
    limits: &CallLimits,
) -> Result<SearchEnvelope> {
    req.validate()?;
    let pattern = compile(&req.pattern)?;
    let matcher = Matcher::new(&pattern)?;
    let strategy = req.strategy();
    tracing::debug!(?strategy, pages = pages.len(), pattern = ?pattern, "search started");

    let mut acc = Accumulator {
        matcher: &matcher,
        context_chars: req.context_chars,
        timeout: Duration::from_millis(req.timeout_per_page_ms),
        pages_scanned: 0,
        total_matches: 0,
        results: Vec::new(),
        errors: Vec::new(),
    };

    let stopped_reason = match strategy {
        Strategy::Exhaustive => {
            let mut texts = Vec::with_capacity(pages.len());
            for page in pages.iter() {
                texts.push((page, extract_page(backend, page, limits).await));
            }
            for (page, text) in texts {
                acc.scan_page(page, text).await;
            }
            StopReason::Completed
        }
        Strategy::EarlyStopping => {
            let mut reason = StopReason::Completed;
            for page in pages.iter() {
                if req
                    .max_pages_scanned
                    .is_some_and(|max| acc.pages_scanned >= max)
                {
                    reason = StopReason::MaxPages;
                    break;
                }
                let text = extract_page(backend, page, limits).await;
                acc.scan_page(page, text).await;
                if req.max_results.is_some_and(|max| acc.total_matches >= max) {
                    reason = StopReason::MaxResults;
                    break;
                }
            }
            reason
        }
    };
    tracing::debug!(
        ?stopped_reason,
        pages_scanned = acc.pages_scanned,
        total_matches = acc.total_matches,
        "search finished"
    );

    Ok(SearchEnvelope {
        pattern: req.pattern.clone(),
        is_regex: pattern.is_regex(),
        strategy,
        pages_requested: pages.len(),
        pages_scanned: acc.pages_scanned,
        pages_with_matches: acc.results.len(),
        total_matches: acc.total_matches,
        completed: stopped_reason == StopReason::Completed,
        stopped_reason,
        max_results: req.max_results,
        max_pages_scanned: req.max_pages_scanned,
        results: acc.results,
        errors: acc.errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::resolve;
    use crate::{DestinationResolver, IndexOnlyResolver, RawOutlineNode};
    use std::sync::Mutex;

    /// In-memory backend that records which pages were extracted.
    struct FakeDoc {
        pages: Vec<&'static str>,
        requested: Mutex<Vec<u32>>,
        fail_page: Option<u32>,
        slow_page: Option<u32>,
    }

    impl FakeDoc {
        fn new(pages: Vec<&'static str>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
                fail_page: None,
                slow_page: None,
            }
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DocumentBackend for FakeDoc {
        fn page_count(&self) -> Result<u32> {
            Ok(self.pages.len() as u32)
        }

        async fn page_text(&self, page: u32) -> Result<String> {
            self.requested.lock().unwrap().push(page);
            if self.fail_page == Some(page) {
                return Err(Error::PageText {
                    page,
                    message: "corrupt content stream".into(),
                });
            }
            if self.slow_page == Some(page) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Ok(self.pages[(page - 1) as usize].to_string())
        }

        async fn raw_outline(&self) -> Result<Option<Vec<RawOutlineNode>>> {
            Ok(None)
        }

        fn resolver(&self) -> &dyn DestinationResolver {
            &IndexOnlyResolver
        }
    }

    fn ten_pages() -> FakeDoc {
        FakeDoc::new(vec![
            "intro", "nothing", "budget one", "budget two", "x", "x", "x", "x", "x", "x",
        ])
    }

    #[tokio::test]
    async fn literal_is_case_insensitive_by_default() {
        let doc = FakeDoc::new(vec!["the budget approved today"]);
        let env = search(
            &doc,
            &PageSet::all(1),
            &SearchRequest::new("Budget"),
            &CallLimits::default(),
        )
        .await
        .unwrap();
        assert_eq!(env.total_matches, 1);
        assert!(!env.is_regex);
        assert_eq!(env.results[0].matches[0].match_start, 4);
    }

    #[tokio::test]
    async fn regex_alternation_yields_independent_snippets() {
        let doc = FakeDoc::new(vec!["Budget for Q3 and the FORECAST for Q4"]);
        let mut req = SearchRequest::new("/budget|forecast/gi");
        req.context_chars = 10;
        let env = search(&doc, &PageSet::all(1), &req, &CallLimits::default())
            .await
            .unwrap();
        assert!(env.is_regex);
        assert_eq!(env.total_matches, 2);
        let m = &env.results[0].matches;
        assert_eq!(m.len(), 2);
        // First match sits at the page start, so its window is shorter on the left.
        assert_eq!(m[0].match_start, 0);
        assert_eq!(&m[0].text[m[0].match_start..m[0].match_end], "Budget");
        assert_eq!(m[0].text, "Budget for Q3 an");
        assert_eq!(m[1].text, "3 and the FORECAST for Q4");
        assert_eq!(m[1].page_offset, 22);
    }

    #[tokio::test]
    async fn exhaustive_scans_every_requested_page() {
        let doc = ten_pages();
        let pages = resolve("2:6", 10).unwrap();
        let env = search(&doc, &pages, &SearchRequest::new("budget"), &CallLimits::default())
            .await
            .unwrap();
        assert!(env.completed);
        assert_eq!(env.strategy, Strategy::Exhaustive);
        assert_eq!(env.stopped_reason, StopReason::Completed);
        assert_eq!(env.pages_scanned, 5);
        assert_eq!(doc.requested(), vec![2, 3, 4, 5, 6]);
        assert_eq!(env.total_matches, 2);
    }

    #[tokio::test]
    async fn max_results_stops_after_first_matching_page() {
        let doc = ten_pages();
        let mut req = SearchRequest::new("budget");
        req.max_results = Some(1);
        let env = search(&doc, &PageSet::all(10), &req, &CallLimits::default())
            .await
            .unwrap();
        assert_eq!(env.stopped_reason, StopReason::MaxResults);
        assert_eq!(env.pages_scanned, 3);
        assert!(!env.completed);
        assert_eq!(doc.requested(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn max_pages_stops_before_the_next_page() {
        let doc = ten_pages();
        let mut req = SearchRequest::new("x");
        req.max_pages_scanned = Some(2);
        let env = search(&doc, &PageSet::all(10), &req, &CallLimits::default())
            .await
            .unwrap();
        assert_eq!(env.stopped_reason, StopReason::MaxPages);
        assert_eq!(env.pages_scanned, 2);
        assert_eq!(doc.requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn early_stopping_without_hitting_limits_completes() {
        let doc = ten_pages();
        let mut req = SearchRequest::new("budget");
        req.max_results = Some(100);
        let env = search(&doc, &PageSet::all(10), &req, &CallLimits::default())
            .await
            .unwrap();
        assert_eq!(env.strategy, Strategy::EarlyStopping);
        assert_eq!(env.stopped_reason, StopReason::Completed);
        assert!(env.completed);
        assert_eq!(env.pages_scanned, 10);
    }

    #[tokio::test]
    async fn page_failures_are_recorded_and_do_not_abort() {
        let mut doc = FakeDoc::new(vec!["hit", "", "hit", "hit"]);
        doc.fail_page = Some(3);
        doc.slow_page = Some(4);
        let limits = CallLimits {
            page_text_timeout_ms: 50,
        };
        let env = search(&doc, &PageSet::all(4), &SearchRequest::new("hit"), &limits)
            .await
            .unwrap();
        assert_eq!(env.total_matches, 1);
        assert_eq!(env.pages_scanned, 4);
        assert_eq!(env.errors.len(), 3, "{:?}", env.errors);
        assert!(env.errors[0].starts_with("Page 2: no extractable text"));
        assert!(env.errors[1].contains("corrupt content stream"));
        assert!(env.errors[2].contains("timed out after 50ms"));
    }

    #[tokio::test]
    async fn excessive_matches_fail_only_that_page() {
        let big: &'static str = Box::leak("a".repeat(20_000).into_boxed_str());
        let doc = FakeDoc::new(vec![big, "one a"]);
        let env = search(&doc, &PageSet::all(2), &SearchRequest::new("a"), &CallLimits::default())
            .await
            .unwrap();
        assert_eq!(env.total_matches, 1);
        assert_eq!(env.results[0].page, 2);
        assert!(env.errors[0].contains("too many matches"));
    }

    #[tokio::test]
    async fn validation_happens_before_any_page_is_read() {
        let doc = ten_pages();
        let mut req = SearchRequest::new("ok");
        req.context_chars = 5;
        assert!(matches!(
            search(&doc, &PageSet::all(10), &req, &CallLimits::default()).await,
            Err(Error::InvalidParams(_))
        ));
        let bad = SearchRequest::new("/(/g");
        assert!(matches!(
            search(&doc, &PageSet::all(10), &bad, &CallLimits::default()).await,
            Err(Error::InvalidPattern(_))
        ));
        assert!(doc.requested().is_empty());
    }

    #[tokio::test]
    async fn scan_timeout_fails_only_that_page() {
        let matcher = Matcher::new(&compile("hit").unwrap()).unwrap();
        let mut acc = Accumulator {
            matcher: &matcher,
            context_chars: DEFAULT_CONTEXT_CHARS,
            timeout: Duration::ZERO,
            pages_scanned: 0,
            total_matches: 0,
            results: Vec::new(),
            errors: Vec::new(),
        };
        acc.scan_page(1, Ok("hit ".repeat(50_000))).await;
        acc.timeout = Duration::from_secs(5);
        acc.scan_page(2, Ok("one hit".to_string())).await;

        assert_eq!(acc.pages_scanned, 2);
        assert_eq!(acc.errors, vec!["Page 1: search timed out after 0ms".to_string()]);
        assert_eq!(acc.total_matches, 1);
        assert_eq!(acc.results.len(), 1);
        assert_eq!(acc.results[0].page, 2);
    }

    #[test]
    fn snippet_windows_clamp_to_text_bounds() {
        let text = "héllo wörld";
        let hits = [Match { start: 0, end: 1 }, Match { start: 8, end: 13 }];
        let s = snippets(text, &hits, 3);
        assert_eq!(s[0].text, "héll");
        assert_eq!((s[0].match_start, s[0].match_end), (0, 1));
        assert_eq!(s[1].text, "o wörld");
        assert_eq!((s[1].match_start, s[1].match_end), (3, 7));
        assert_eq!(s[1].page_offset, 7);
    }
}
