//! Bounded per-page matching: wall-clock timeout plus a hard match-count ceiling.
//!
//! The whole page is scanned eagerly on a blocking thread and raced against a timer. When the
//! timer wins, partial results are dropped; the scan loop also checks the same deadline so the
//! abandoned thread stops burning CPU soon after.

use crate::pattern::CompiledPattern;
use crate::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// More matches than this on one page fails the page.
pub const MAX_MATCHES_PER_PAGE: usize = 10_000;

// Deadline checks are cheap but not free.
const DEADLINE_CHECK_EVERY: usize = 64;

/// Byte offsets of one match within the page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Match {
    pub start: usize,
    pub end: usize,
}

impl Match {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Executable form of a [`CompiledPattern`].
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
    match_all: bool,
}

impl Matcher {
    pub fn new(pattern: &CompiledPattern) -> Result<Self> {
        Ok(Self {
            regex: pattern.build()?,
            match_all: pattern.match_all(),
        })
    }

    /// Synchronous scan. `deadline` is checked between matches.
    pub fn scan_until(&self, text: &str, deadline: Option<(Instant, u64)>) -> Result<Vec<Match>> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        let mut iter = 0usize;
        while pos <= text.len() {
            if let Some((at, timeout_ms)) = deadline {
                if iter % DEADLINE_CHECK_EVERY == 0 && Instant::now() >= at {
                    return Err(Error::SearchTimeout { timeout_ms });
                }
            }
            iter += 1;

            let Some(m) = self.regex.find_at(text, pos) else {
                break;
            };
            out.push(Match {
                start: m.start(),
                end: m.end(),
            });
            if out.len() > MAX_MATCHES_PER_PAGE {
                return Err(Error::ExcessiveMatches {
                    limit: MAX_MATCHES_PER_PAGE,
                });
            }
            if !self.match_all {
                break;
            }
            pos = if m.end() > m.start() {
                m.end()
            } else {
                // Zero-width: step one char so the next search cannot land on the same spot.
                match text[m.end()..].chars().next() {
                    Some(c) => m.end() + c.len_utf8(),
                    None => break,
                }
            };
        }
        Ok(out)
    }

    /// Scan `text` with a wall-clock `timeout`.
    pub async fn scan(&self, text: Arc<str>, timeout: Duration) -> Result<Vec<Match>> {
        let timeout_ms = timeout.as_millis() as u64;
        let deadline = Instant::now() + timeout;
        let this = self.clone();
        let task =
            tokio::task::spawn_blocking(move || this.scan_until(&text, Some((deadline, timeout_ms))));
        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(Error::SearchTimeout { timeout_ms }),
            Ok(Err(join)) => Err(Error::Backend(format!("scan task failed: {join}"))),
            Ok(Ok(res)) => res,
        }
    }
}

/// Compile-and-scan convenience for one page.
pub async fn scan(text: &str, pattern: &CompiledPattern, timeout: Duration) -> Result<Vec<Match>> {
    Matcher::new(pattern)?.scan(Arc::from(text), timeout).await
}
