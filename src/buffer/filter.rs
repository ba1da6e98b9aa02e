/*!
 * Event Filters
 * Caller-supplied predicates applied after normalization
 */

use crate::core::errors::CaptureError;
use crate::core::limits::{REGEX_DFA_SIZE_LIMIT, REGEX_SIZE_LIMIT};
use crate::events::{CapturedEvent, EventKind};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::warn;

/// How an attribute filter compares against the event value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
}

/// Case-insensitive attribute matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMatch {
    pub value: String,
    #[serde(default)]
    pub mode: MatchMode,
}

impl AttributeMatch {
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            mode: MatchMode::Exact,
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            mode: MatchMode::Contains,
        }
    }

    fn matches(&self, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };
        match self.mode {
            MatchMode::Exact => candidate.to_lowercase() == self.value.to_lowercase(),
            MatchMode::Contains => contains_ci(candidate, &self.value),
        }
    }
}

/// Event filter for fetches and streams
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub database: Option<AttributeMatch>,
    pub application: Option<AttributeMatch>,
    pub login: Option<AttributeMatch>,
    /// Keep only events whose text contains this substring
    pub text_include: Option<String>,
    /// Drop events whose text contains this substring
    pub text_exclude: Option<String>,
    pub min_duration_us: Option<u64>,
    pub kinds: Option<Vec<EventKind>>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub since: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub until: Option<OffsetDateTime>,
}

impl EventFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(mut self, matcher: AttributeMatch) -> Self {
        self.database = Some(matcher);
        self
    }

    pub fn application(mut self, matcher: AttributeMatch) -> Self {
        self.application = Some(matcher);
        self
    }

    pub fn login(mut self, matcher: AttributeMatch) -> Self {
        self.login = Some(matcher);
        self
    }

    pub fn text_include(mut self, needle: impl Into<String>) -> Self {
        self.text_include = Some(needle.into());
        self
    }

    pub fn text_exclude(mut self, needle: impl Into<String>) -> Self {
        self.text_exclude = Some(needle.into());
        self
    }

    pub fn min_duration_us(mut self, threshold: u64) -> Self {
        self.min_duration_us = Some(threshold);
        self
    }

    pub fn kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn since(mut self, since: OffsetDateTime) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: OffsetDateTime) -> Self {
        self.until = Some(until);
        self
    }

    /// Check if an event passes every configured predicate
    ///
    /// Events without a timestamp are not subject to the time window.
    pub fn matches(&self, event: &CapturedEvent) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }

        if let Some(ts) = event.timestamp {
            if self.since.is_some_and(|since| ts < since) {
                return false;
            }
            if self.until.is_some_and(|until| ts > until) {
                return false;
            }
        }

        if let Some(threshold) = self.min_duration_us {
            if event.counters.duration_us < threshold {
                return false;
            }
        }

        let origin = &event.origin;
        for (matcher, value) in [
            (&self.database, origin.database.as_deref()),
            (&self.application, origin.application.as_deref()),
            (&self.login, origin.login.as_deref()),
        ] {
            if let Some(matcher) = matcher {
                if !matcher.matches(value) {
                    return false;
                }
            }
        }

        if let Some(needle) = &self.text_include {
            if !contains_ci(&event.text, needle) {
                return false;
            }
        }

        if let Some(needle) = &self.text_exclude {
            if contains_ci(&event.text, needle) {
                return false;
            }
        }

        true
    }
}

#[inline]
fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

struct ExclusionPattern {
    source: String,
    regex: Regex,
    tripped: AtomicBool,
}

/// Compiled exclusion patterns for one fetch
///
/// Invalid patterns are dropped at compile time and never match. A pattern
/// whose evaluation overruns the budget counts as a non-match and is skipped
/// for the rest of the fetch.
pub struct ExclusionSet {
    patterns: Vec<ExclusionPattern>,
    budget: Duration,
}

impl ExclusionSet {
    /// Empty set that excludes nothing
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            budget: Duration::MAX,
        }
    }

    /// Compile patterns, logging and skipping the ones that fail
    pub fn compile<S: AsRef<str>>(patterns: &[S], budget: Duration) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|pattern| match compile_pattern(pattern.as_ref()) {
                Ok(regex) => Some(ExclusionPattern {
                    source: pattern.as_ref().to_string(),
                    regex,
                    tripped: AtomicBool::new(false),
                }),
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid exclusion pattern");
                    None
                }
            })
            .collect();

        Self {
            patterns: compiled,
            budget,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Re-arm patterns disabled by a budget overrun, ahead of the next fetch
    pub fn reset(&self) {
        for pattern in &self.patterns {
            pattern.tripped.store(false, Ordering::Relaxed);
        }
    }

    /// Whether any active pattern matches the text
    pub fn excludes(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern.tripped.load(Ordering::Relaxed) {
                return false;
            }
            let started = Instant::now();
            let matched = pattern.regex.is_match(text);
            if started.elapsed() > self.budget {
                pattern.tripped.store(true, Ordering::Relaxed);
                warn!(
                    pattern = %pattern.source,
                    budget_ms = self.budget.as_millis() as u64,
                    "Exclusion pattern exceeded evaluation budget, treating as non-match"
                );
                return false;
            }
            matched
        })
    }
}

impl std::fmt::Debug for ExclusionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusionSet")
            .field(
                "patterns",
                &self.patterns.iter().map(|p| &p.source).collect::<Vec<_>>(),
            )
            .field("budget", &self.budget)
            .finish()
    }
}

/// Compile one exclusion pattern, case-insensitive with bounded program size
pub fn compile_pattern(pattern: &str) -> Result<Regex, CaptureError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .dfa_size_limit(REGEX_DFA_SIZE_LIMIT)
        .build()
        .map_err(|e| CaptureError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
