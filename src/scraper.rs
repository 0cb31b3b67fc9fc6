//! Run orchestrator.
//!
//! [`LinkedinScraper`] owns the session manager and the single extraction
//! strategy, chosen once at construction: authenticated when a `li_at`
//! cookie is configured, anonymous otherwise. `run` drives the
//! query x location loop; results flow exclusively through the event
//! channel handed out by [`LinkedinScraper::new`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::interceptor;
use crate::query::{validate, Query, QueryOptions, ResolvedOptions};
use crate::search_url::build_search_url;
use crate::session::SessionManager;
use crate::strategies::{AnonymousStrategy, AuthenticatedStrategy, RunStrategy};

pub struct LinkedinScraper {
    session: SessionManager,
    bus: EventBus,
    strategy: Box<dyn RunStrategy>,
}

impl LinkedinScraper {
    /// Build a scraper and the receiving end of its event stream. The
    /// browser is not launched until the first [`LinkedinScraper::run`].
    pub fn new(config: BrowserConfig) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (bus, rx) = EventBus::new();
        let config = Arc::new(config);

        let strategy: Box<dyn RunStrategy> = match &config.li_at_cookie {
            Some(cookie) => {
                info!("session cookie configured, using authenticated strategy");
                Box::new(AuthenticatedStrategy::new(
                    config.clone(),
                    bus.clone(),
                    cookie.clone(),
                ))
            }
            None => Box::new(AnonymousStrategy::new(config.clone(), bus.clone())),
        };

        let session = SessionManager::new(config, bus.clone());

        (
            Self {
                session,
                bus,
                strategy,
            },
            rx,
        )
    }

    /// Scrape every query against every one of its locations.
    ///
    /// All queries are merged and validated before any browser activity;
    /// a non-empty problem list aborts the whole run with
    /// [`Error::InvalidQuery`]. On any other error the browser is torn
    /// down, an [`Event::Error`] is emitted and the error is returned.
    pub async fn run(
        &self,
        queries: impl Into<Vec<Query>>,
        options: Option<QueryOptions>,
    ) -> Result<()> {
        match self.run_inner(queries.into(), options).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(error = %err, "run failed");
                self.bus.emit(Event::Error(err.to_string()));
                self.session.close().await;
                Err(err)
            }
        }
    }

    async fn run_inner(&self, queries: Vec<Query>, options: Option<QueryOptions>) -> Result<()> {
        let mut resolved: Vec<(Query, ResolvedOptions)> = Vec::with_capacity(queries.len());
        let mut problems = Vec::new();

        for query in queries {
            let merged = ResolvedOptions::merge(options.as_ref(), query.options.as_ref());
            problems.extend(validate(&query, &merged));
            resolved.push((query, merged));
        }
        if !problems.is_empty() {
            return Err(Error::InvalidQuery(problems));
        }

        self.session.ensure_initialized().await?;

        for (query, options) in &resolved {
            let keyword = query.query.as_deref().unwrap_or("");

            if options.optimize {
                warn!("optimize is enabled; pagination may stall on some layouts");
            }

            for location in &options.locations {
                info!(%keyword, %location, "starting location");

                let tab = self.session.new_page()?;
                interceptor::attach(&tab, options.optimize)?;
                observe_response_status(&tab);

                let search_url = build_search_url(keyword, location, options);
                let outcome = self
                    .strategy
                    .run(&tab, &search_url, keyword, location, options)
                    .await;
                self.session.close_page(&tab);

                if outcome?.exit {
                    // Forced termination still completes the stream.
                    self.bus.emit(Event::End);
                    return Ok(());
                }
            }
        }

        self.bus.emit(Event::End);
        Ok(())
    }

    /// Tear the browser down. Safe to call at any point, any number of
    /// times; a later `run` relaunches from scratch.
    pub async fn close(&self) {
        self.session.close().await;
    }
}

/// Log throttling and request failures observed on a page. A 429 means the
/// site is rate limiting this session; slowing down is the only remedy.
fn observe_response_status(tab: &Arc<headless_chrome::Tab>) {
    let registered = tab.register_response_handling(
        "status_observer",
        Box::new(|params, _body| {
            let status = params.response.status;
            if status == 429 {
                warn!(
                    url = %params.response.url,
                    "rate limited (429); consider raising slow_mo"
                );
            } else if status >= 400 {
                warn!(url = %params.response.url, status, "request failed");
            }
        }),
    );
    if let Err(err) = registered {
        warn!(error = %err, "failed to attach response status observer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[tokio::test]
    async fn invalid_queries_abort_before_any_browser_launch() {
        init_tracing();
        let (scraper, mut rx) = LinkedinScraper::new(BrowserConfig::default());

        let query = Query::new("engineer").with_options(QueryOptions {
            limit: Some(0),
            locations: Some(vec!["".into()]),
            ..Default::default()
        });

        let err = scraper.run(query, None).await.unwrap_err();
        match err {
            Error::InvalidQuery(problems) => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {other}"),
        }

        // The failure is also visible on the stream.
        assert!(matches!(rx.recv().await, Some(Event::Error(_))));
    }

    #[tokio::test]
    async fn validation_covers_every_query_of_the_batch() {
        init_tracing();
        let (scraper, _rx) = LinkedinScraper::new(BrowserConfig::default());

        let queries = vec![
            Query::new("engineer").with_options(QueryOptions {
                limit: Some(0),
                ..Default::default()
            }),
            Query::new("designer").with_options(QueryOptions {
                description_fn: Some("  ".into()),
                ..Default::default()
            }),
        ];

        let err = scraper.run(queries, None).await.unwrap_err();
        match err {
            Error::InvalidQuery(problems) => {
                let params: Vec<&str> = problems.iter().map(|p| p.param.as_str()).collect();
                assert!(params.contains(&"options.limit"));
                assert!(params.contains(&"options.descriptionFn"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
