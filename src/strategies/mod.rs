//! Extraction strategies.
//!
//! One strategy drives one page through the whole state machine:
//! session check, container wait, extract/load-more loop, done. The variant
//! is chosen once at scraper construction: [`AuthenticatedStrategy`] when a
//! session cookie is configured, [`AnonymousStrategy`] otherwise.

mod anonymous;
mod authenticated;

pub use anonymous::AnonymousStrategy;
pub use authenticated::AuthenticatedStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use headless_chrome::Tab;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::query::ResolvedOptions;

/// Outcome of running one strategy against one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyRunResult {
    /// `true` forces the orchestrator to abandon every remaining
    /// location and query of the current run (invalid session).
    pub exit: bool,
}

impl StrategyRunResult {
    pub const CONTINUE: Self = Self { exit: false };
    pub const EXIT: Self = Self { exit: true };
}

#[async_trait]
pub trait RunStrategy: Send + Sync {
    async fn run(
        &self,
        tab: &Arc<Tab>,
        search_url: &Url,
        keyword: &str,
        location: &str,
        options: &ResolvedOptions,
    ) -> Result<StrategyRunResult>;
}

/// Pure pagination bookkeeping shared by both strategies.
///
/// Tracks how many items have been observed in the container, how many were
/// already handed to extraction, and how many consecutive load-more triggers
/// produced no growth. The emitted-record budget (`limit`) is enforced by
/// the caller between items so in-flight items are flushed, never discarded.
#[derive(Debug)]
pub struct PaginationTracker {
    limit: usize,
    max_no_growth: usize,
    seen: usize,
    processed: usize,
    no_growth_strikes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStep {
    /// New items appeared; extraction should resume.
    Grew,
    /// No growth yet, but still within the strike budget.
    Stalled,
    /// Strike budget exceeded or limit reached; transition to done.
    Exhausted,
}

impl PaginationTracker {
    pub fn new(limit: usize, max_no_growth: usize) -> Self {
        Self {
            limit,
            max_no_growth,
            seen: 0,
            processed: 0,
            no_growth_strikes: 0,
        }
    }

    /// Record the current container item count after a load-more trigger.
    pub fn observe(&mut self, total_items: usize) -> PaginationStep {
        if total_items > self.seen {
            self.seen = total_items;
            self.no_growth_strikes = 0;
            PaginationStep::Grew
        } else {
            self.no_growth_strikes += 1;
            if self.no_growth_strikes >= self.max_no_growth {
                PaginationStep::Exhausted
            } else {
                PaginationStep::Stalled
            }
        }
    }

    /// Next item index not yet handed to extraction.
    pub fn next_index(&self) -> usize {
        self.processed
    }

    pub fn mark_processed(&mut self) {
        self.processed += 1;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Whether the emitted-record budget still has room.
    pub fn within_limit(&self) -> bool {
        self.processed < self.limit
    }
}

/// Summary fields readable from a result card without opening the detail
/// panel. Deserialized from in-page snapshot scripts, camelCase keys.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct JobSummary {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub company_link: Option<String>,
    pub company_img_link: Option<String>,
    pub place: String,
    pub date: String,
    pub link: String,
    pub apply_link: Option<String>,
    pub promoted: bool,
}

/// Fields read from the detail panel once it has populated.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct JobDetails {
    pub description: String,
    pub description_html: String,
    pub insights: Vec<String>,
    pub skills: Option<Vec<String>>,
    pub apply_link: Option<String>,
    pub company_link: Option<String>,
    pub company_img_link: Option<String>,
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n\r\t ]+").expect("static regex"));

/// Collapse runs of whitespace the way the site pads its text nodes.
pub(crate) fn normalize(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Substitute `__TOKEN__` placeholders in an extraction script. Keeps the
/// scripts readable next to `format!` brace-escaping.
pub(crate) fn render(template: &str, subs: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (token, value) in subs {
        out = out.replace(token, value);
    }
    out
}

/// Evaluate a script that returns `JSON.stringify(...)` and parse the result.
pub(crate) fn evaluate_json(tab: &Arc<Tab>, script: &str) -> Result<Value> {
    let remote = tab.evaluate(script, false)?;
    match remote.value {
        Some(Value::String(json)) => {
            serde_json::from_str(&json).map_err(|e| Error::Browser(e.into()))
        }
        Some(other) => Ok(other),
        None => Ok(Value::Null),
    }
}

/// Poll for a selector with a hard bound; `false` on timeout.
pub(crate) fn selector_appears(
    tab: &Arc<Tab>,
    selector: &str,
    timeout: std::time::Duration,
) -> bool {
    tab.wait_for_element_with_custom_timeout(selector, timeout)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn three_growths_then_stall_exhausts_within_bound() {
        // Mock container growing across three load-more triggers, then flat.
        let mut tracker = PaginationTracker::new(100, 2);

        assert_eq!(tracker.observe(25), PaginationStep::Grew);
        assert_eq!(tracker.observe(50), PaginationStep::Grew);
        assert_eq!(tracker.observe(75), PaginationStep::Grew);
        assert_eq!(tracker.observe(75), PaginationStep::Stalled);
        assert_eq!(tracker.observe(75), PaginationStep::Exhausted);

        // Every unique item present after the third growth is extractable.
        let mut emitted = 0;
        while tracker.within_limit() && tracker.next_index() < 75 {
            tracker.mark_processed();
            emitted += 1;
        }
        assert_eq!(emitted, 75);
    }

    #[test]
    fn growth_resets_the_strike_counter() {
        let mut tracker = PaginationTracker::new(100, 2);
        tracker.observe(10);
        assert_eq!(tracker.observe(10), PaginationStep::Stalled);
        assert_eq!(tracker.observe(20), PaginationStep::Grew);
        assert_eq!(tracker.observe(20), PaginationStep::Stalled);
        assert_eq!(tracker.observe(20), PaginationStep::Exhausted);
    }

    #[test]
    fn limit_bounds_processing_not_observation() {
        let mut tracker = PaginationTracker::new(3, 2);
        tracker.observe(25);
        while tracker.within_limit() && tracker.next_index() < 25 {
            tracker.mark_processed();
        }
        assert_eq!(tracker.processed(), 3);
        assert!(!tracker.within_limit());
    }

    #[test]
    fn normalize_collapses_padding() {
        assert_eq!(normalize("  Senior\n\tEngineer \r\n"), "Senior Engineer");
    }

    #[test]
    fn render_substitutes_all_tokens() {
        let out = render("q('__A__').x('__B__', '__A__')", &[("__A__", "one"), ("__B__", "two")]);
        assert_eq!(out, "q('one').x('two', 'one')");
    }
}
