//! Search patterns: plain literals or `/body/flags` regular expressions.
//!
//! The compiled form is data (serialisable, comparable); the executable regex is built from it on
//! demand so flag handling lives in exactly one place.

use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Flags accepted after the closing delimiter.
pub const SUPPORTED_FLAGS: &str = "gimsux";

const DELIMITER: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompiledPattern {
    /// Exact substring search; `escaped` already has every metacharacter escaped.
    Literal {
        escaped: String,
        case_insensitive: bool,
    },
    /// A regular expression with exactly the caller's flags.
    Regex { source: String, flags: String },
}

impl CompiledPattern {
    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex { .. })
    }

    /// Literals report every occurrence; regexes only with `g`.
    pub fn match_all(&self) -> bool {
        match self {
            Self::Literal { .. } => true,
            Self::Regex { flags, .. } => flags.contains('g'),
        }
    }

    /// Build the executable matcher.
    pub fn build(&self) -> Result<Regex> {
        let mut b = match self {
            Self::Literal {
                escaped,
                case_insensitive,
            } => {
                let mut b = RegexBuilder::new(escaped);
                b.case_insensitive(*case_insensitive);
                b
            }
            Self::Regex { source, flags } => {
                let mut b = RegexBuilder::new(source);
                b.case_insensitive(flags.contains('i'))
                    .multi_line(flags.contains('m'))
                    .dot_matches_new_line(flags.contains('s'))
                    .ignore_whitespace(flags.contains('x'));
                b
            }
        };
        b.unicode(true)
            .build()
            .map_err(|e| Error::InvalidPattern(e.to_string()))
    }
}

/// `/body/flags` split, if the pattern is delimited.
fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix(DELIMITER)?;
    let close = rest.rfind(DELIMITER)?;
    Some((&rest[..close], &rest[close + 1..]))
}

fn check_flags(flags: &str) -> Result<()> {
    let mut seen = String::new();
    for f in flags.chars() {
        if !SUPPORTED_FLAGS.contains(f) {
            return Err(Error::InvalidPattern(format!(
                "unsupported flag '{f}' (allowed: {SUPPORTED_FLAGS})"
            )));
        }
        if seen.contains(f) {
            return Err(Error::InvalidPattern(format!("duplicate flag '{f}'")));
        }
        seen.push(f);
    }
    Ok(())
}

/// Compile a pattern expression. Validates fully: a returned pattern always builds.
pub fn compile(pattern: &str) -> Result<CompiledPattern> {
    if pattern.is_empty() {
        return Err(Error::InvalidPattern("pattern must be non-empty".to_string()));
    }
    let compiled = match split_delimited(pattern) {
        Some((body, flags)) => {
            if body.is_empty() {
                return Err(Error::InvalidPattern(format!(
                    "{pattern}: empty regular expression"
                )));
            }
            check_flags(flags)?;
            CompiledPattern::Regex {
                source: body.to_string(),
                flags: flags.to_string(),
            }
        }
        None => CompiledPattern::Literal {
            escaped: regex::escape(pattern),
            case_insensitive: true,
        },
    };
    compiled
        .build()
        .map_err(|e| Error::InvalidPattern(format!("{pattern}: {e}")))?;
    Ok(compiled)
}
