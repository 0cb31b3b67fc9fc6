//! Per-request network filtering.
//!
//! Every sub-resource request goes through [`decide`], a pure function with
//! no shared state across requests: tracking endpoints are aborted, anything
//! outside the site's two registrable domains is aborted, and with the
//! query's `optimize` flag heavy resource classes are aborted too. The
//! decision is wired into the page through the CDP Fetch domain and must be
//! attached before the first navigation or early requests bypass filtering.

use std::sync::Arc;

use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision};
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::{events::RequestPausedEvent, FailRequest};
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::Tab;
use tracing::trace;

use crate::error::Result;

/// Path fragments of tracking and telemetry endpoints.
const BLOCKED_PATHS: &[&str] = &[
    "li/track",
    "realtime.www.linkedin.com/realtime",
    "platform.linkedin.com/litms",
    "linkedin.com/sensorCollect",
    "linkedin.com/pixel/tracking",
];

/// Registrable domains requests may go to: the site itself and its static
/// asset CDN.
const ALLOWED_DOMAINS: &[&str] = &["linkedin.com", "licdn.com"];

/// URL suffix classes additionally blocked under `optimize`.
const BLOCKED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".css"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    Continue,
    Abort,
}

/// Decide whether one request may proceed.
pub fn decide(url: &str, resource_type: &ResourceType, optimize: bool) -> InterceptDecision {
    if BLOCKED_PATHS.iter().any(|p| url.contains(p)) {
        return InterceptDecision::Abort;
    }

    match registrable_domain(url) {
        Some(domain) if ALLOWED_DOMAINS.contains(&domain.as_str()) => {}
        _ => return InterceptDecision::Abort,
    }

    if optimize {
        let heavy = matches!(
            resource_type,
            ResourceType::Image | ResourceType::Stylesheet | ResourceType::Media | ResourceType::Font
        );
        if heavy || BLOCKED_EXTENSIONS.iter().any(|ext| url.contains(ext)) {
            return InterceptDecision::Abort;
        }
    }

    InterceptDecision::Continue
}

/// Last two labels of the request host, lowercased.
fn registrable_domain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    let start = labels.len().saturating_sub(2);
    Some(labels[start..].join(".").to_lowercase())
}

/// Enable Fetch-domain interception on a page. Call before navigating.
pub fn attach(tab: &Arc<Tab>, optimize: bool) -> Result<()> {
    tab.enable_fetch(None, None)?;

    let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
        move |_transport: Arc<Transport>, _session_id: SessionId, event: RequestPausedEvent| {
            let params = event.params;
            match decide(&params.request.url, &params.resource_Type, optimize) {
                InterceptDecision::Abort => {
                    trace!(url = %params.request.url, "aborting request");
                    RequestPausedDecision::Fail(FailRequest {
                        request_id: params.request_id,
                        error_reason: ErrorReason::BlockedByClient,
                    })
                }
                InterceptDecision::Continue => RequestPausedDecision::Continue(None),
            }
        },
    );

    tab.enable_request_interception(interceptor)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_paths_are_aborted() {
        assert_eq!(
            decide(
                "https://www.linkedin.com/li/track",
                &ResourceType::Xhr,
                false
            ),
            InterceptDecision::Abort
        );
        assert_eq!(
            decide(
                "https://www.linkedin.com/pixel/tracking?x=1",
                &ResourceType::Ping,
                false
            ),
            InterceptDecision::Abort
        );
    }

    #[test]
    fn third_party_domains_are_aborted() {
        assert_eq!(
            decide(
                "https://analytics.example.com/collect",
                &ResourceType::Script,
                false
            ),
            InterceptDecision::Abort
        );
    }

    #[test]
    fn allowed_image_continues_without_optimize() {
        assert_eq!(
            decide(
                "https://media.licdn.com/dms/image/logo.png",
                &ResourceType::Image,
                false
            ),
            InterceptDecision::Continue
        );
    }

    #[test]
    fn optimize_blocks_heavy_resources_and_extensions() {
        assert_eq!(
            decide(
                "https://media.licdn.com/dms/image/logo",
                &ResourceType::Image,
                true
            ),
            InterceptDecision::Abort
        );
        assert_eq!(
            decide(
                "https://static.licdn.com/sc/theme.css",
                &ResourceType::Other,
                true
            ),
            InterceptDecision::Abort
        );
        // Scripts and documents still pass under optimize.
        assert_eq!(
            decide(
                "https://www.linkedin.com/jobs/search?start=0",
                &ResourceType::Document,
                true
            ),
            InterceptDecision::Continue
        );
    }

    #[test]
    fn subdomains_resolve_to_the_registrable_domain() {
        assert_eq!(
            registrable_domain("https://static-exp1.licdn.com/x.js").as_deref(),
            Some("licdn.com")
        );
        assert_eq!(
            registrable_domain("https://www.linkedin.com/jobs").as_deref(),
            Some("linkedin.com")
        );
    }
}
