//! Error taxonomy for the scraping engine.
//!
//! Configuration problems are reported before any browser activity and abort
//! the whole run. Bounded waits that expire mid-run surface as [`Error::Timeout`]
//! and are recovered locally by the strategies where possible. Anything coming
//! out of the browser layer is wrapped in [`Error::Browser`].

use std::time::Duration;

use thiserror::Error;

use crate::query::ValidationError;

#[derive(Debug, Error)]
pub enum Error {
    /// One or more queries failed validation. The whole run is aborted
    /// before the browser is touched.
    #[error("invalid query: {}", format_validation_errors(.0))]
    InvalidQuery(Vec<ValidationError>),

    /// A concurrent caller waited for browser initialization longer than the
    /// configured bound.
    #[error("initialize timeout exceeded: {0:?}")]
    InitializeTimeout(Duration),

    /// A bounded wait (container, detail panel, pagination growth) expired.
    #[error("timed out waiting for {what} after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    /// Failure raised by the underlying browser session.
    #[error("browser error: {0}")]
    Browser(#[from] anyhow::Error),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
