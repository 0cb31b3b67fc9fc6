//! Event stream surface.
//!
//! Results are never returned from [`crate::scraper::LinkedinScraper::run`]:
//! every record, warning and lifecycle change is pushed through an unbounded
//! channel handed to the caller at construction time. Emission must never
//! fail the run, so a dropped receiver only logs at debug level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// One normalized job listing, emitted as soon as it is extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Keyword of the query that produced this record.
    pub query: String,
    /// Location of the query that produced this record.
    pub location: String,
    pub job_id: String,
    /// Zero-based position of the job within the whole location run.
    pub job_index: usize,
    pub title: String,
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_img_link: Option<String>,
    pub place: String,
    pub date: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_link: Option<String>,
    pub description: String,
    pub description_html: String,
    pub insights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
}

/// Per-location throughput counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperMetrics {
    pub query: String,
    pub location: String,
    /// Records successfully emitted.
    pub processed: usize,
    /// Items whose detail extraction failed.
    pub failed: usize,
    /// Items skipped (promoted jobs, malformed cards).
    pub missed: usize,
    pub timestamp: DateTime<Utc>,
}

/// Everything a consumer can observe from a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job record was extracted.
    Data(JobRecord),
    /// An unexpected error occurred; the browser has been torn down.
    Error(String),
    /// Progress counters for one scraped location.
    Metrics(ScraperMetrics),
    /// The configured session credential was rejected. Fatal for the run.
    InvalidSession,
    /// All queries and locations completed (or the run was force-terminated).
    End,
    /// Browser lifecycle passthrough: browser teardown, page open, page
    /// navigation, page close.
    Disconnected,
    TargetCreated,
    TargetChanged,
    TargetDestroyed,
}

/// Cloneable sender half shared by the orchestrator and the strategies.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. A closed receiver is not an error for the run.
    pub fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let (bus, mut rx) = EventBus::new();
        bus.emit(Event::InvalidSession);
        bus.emit(Event::End);

        assert!(matches!(rx.recv().await, Some(Event::InvalidSession)));
        assert!(matches!(rx.recv().await, Some(Event::End)));
    }

    #[tokio::test]
    async fn emit_survives_dropped_receiver() {
        let (bus, rx) = EventBus::new();
        drop(rx);
        bus.emit(Event::End);
    }
}
