//! Anonymous extraction strategy.
//!
//! Drives the public two-pane search results: no credential, pagination via
//! the "see more jobs" control and scroll-to-bottom growth. The public
//! markup has two generations of class names, so the container wait probes
//! both and the matching selector set is used for the rest of the location.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::Tab;
use scraper::{Html, Selector};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BrowserConfig;
use crate::error::Result;
use crate::events::{Event, EventBus, JobRecord, ScraperMetrics};
use crate::query::ResolvedOptions;
use crate::selectors::{SelectorSet, ANONYMOUS, ANONYMOUS_LEGACY, COOKIE_ACCEPT};

use super::{
    evaluate_json, normalize, render, selector_appears, JobDetails, JobSummary, PaginationStep,
    PaginationTracker, RunStrategy, StrategyRunResult,
};

const DETAILS_POLL_INTERVAL: Duration = Duration::from_millis(200);
const LOAD_MORE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// `true` when the page was redirected to the authentication wall.
pub(crate) fn is_auth_wall(url: &str) -> bool {
    url.contains("linkedin.com/authwall")
        || url.contains("/checkpoint/")
        || url.contains("/uas/login")
}

pub struct AnonymousStrategy {
    config: Arc<BrowserConfig>,
    bus: EventBus,
}

impl AnonymousStrategy {
    pub fn new(config: Arc<BrowserConfig>, bus: EventBus) -> Self {
        Self { config, bus }
    }

    /// Session check run after navigation. Anonymous runs cannot recover
    /// from the wall, so hitting it emits an error event and `Some(EXIT)`
    /// tells the orchestrator to abandon the run before any extraction.
    fn check_auth_wall(&self, tag: &str, url: &str) -> Option<StrategyRunResult> {
        if is_auth_wall(url) {
            warn!("{tag} anonymous session hit the authentication wall, terminating run");
            self.bus.emit(Event::Error(format!(
                "{tag} failed to run in anonymous mode: authentication required for this environment"
            )));
            return Some(StrategyRunResult::EXIT);
        }
        None
    }

    /// Dismiss the cookie banner if present. Absence is not an error.
    fn accept_cookies(&self, tab: &Arc<Tab>) {
        let script = render(
            r#"
            (() => {
                const btn = document.querySelector("__ACCEPT__");
                if (btn) { btn.click(); return "accepted"; }
                return "absent";
            })();
            "#,
            &[("__ACCEPT__", COOKIE_ACCEPT)],
        );
        match tab.evaluate(&script, false) {
            Ok(result) => debug!(result = ?result.value, "cookie banner check"),
            Err(err) => debug!(error = %err, "cookie banner check failed"),
        }
    }

    /// Probe which markup generation the session was served.
    fn wait_for_container(&self, tab: &Arc<Tab>) -> Option<&'static SelectorSet> {
        let timeout = self.config.container_timeout;
        let probe = Duration::from_millis(500);
        let mut elapsed = Duration::ZERO;

        while elapsed < timeout {
            for set in [&ANONYMOUS, &ANONYMOUS_LEGACY] {
                if selector_appears(tab, set.container, probe) {
                    return Some(set);
                }
                elapsed += probe;
            }
        }
        None
    }

    /// Parse every result card currently in the list.
    fn parse_summaries(&self, tab: &Arc<Tab>, selectors: &SelectorSet) -> Result<Vec<JobSummary>> {
        let html = tab.get_content()?;
        let document = Html::parse_document(&html);

        let jobs = Selector::parse(selectors.jobs).unwrap();
        let link = Selector::parse(selectors.link).unwrap();
        let title = Selector::parse(selectors.title).unwrap();
        let company = Selector::parse(selectors.company).unwrap();
        let company_anchor = Selector::parse("a").unwrap();
        let company_img = Selector::parse("img").unwrap();
        let place = Selector::parse(selectors.place).unwrap();
        let date = Selector::parse(selectors.date).unwrap();
        let entity = Selector::parse("[data-entity-urn]").unwrap();

        let mut summaries = Vec::new();

        for card in document.select(&jobs) {
            let text_of = |sel: &Selector| {
                card.select(sel)
                    .next()
                    .map(|e| normalize(&e.text().collect::<String>()))
                    .unwrap_or_default()
            };

            let job_id = card
                .value()
                .attr("data-entity-urn")
                .or_else(|| card.select(&entity).next().and_then(|e| e.value().attr("data-entity-urn")))
                .map(|urn| urn.rsplit(':').next().unwrap_or(urn).to_string())
                .or_else(|| card.value().attr("data-id").map(str::to_string))
                .unwrap_or_default();

            let link_href = card
                .select(&link)
                .next()
                .and_then(|e| e.value().attr("href"))
                .unwrap_or_default()
                .to_string();

            let company_el = card.select(&company).next();
            let company_link = company_el
                .and_then(|e| e.select(&company_anchor).next())
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string);
            let company_img_link = card
                .select(&company_img)
                .next()
                .and_then(|img| img.value().attr("data-delayed-url").or_else(|| img.value().attr("src")))
                .map(str::to_string);

            let date_text = card
                .select(&date)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .unwrap_or_default()
                .to_string();

            let promoted = card
                .text()
                .any(|t| t.trim().eq_ignore_ascii_case("promoted"));

            summaries.push(JobSummary {
                job_id,
                title: text_of(&title),
                company: text_of(&company),
                company_link,
                company_img_link,
                place: text_of(&place),
                date: date_text,
                link: link_href,
                apply_link: None,
                promoted,
            });
        }

        Ok(summaries)
    }

    /// Click the card at `index` and wait for the detail panel to populate.
    async fn load_details(
        &self,
        tab: &Arc<Tab>,
        selectors: &SelectorSet,
        index: usize,
        options: &ResolvedOptions,
    ) -> Result<Option<JobDetails>> {
        let click = render(
            r#"
            (() => {
                const cards = document.querySelectorAll("__JOBS__");
                const card = cards[__INDEX__];
                if (!card) return "missing";
                const link = card.querySelector("__LINK__") || card;
                link.scrollIntoView({block: "center"});
                link.click();
                return "clicked";
            })();
            "#,
            &[
                ("__JOBS__", selectors.jobs),
                ("__LINK__", selectors.link),
                ("__INDEX__", &index.to_string()),
            ],
        );
        tab.evaluate(&click, false)?;

        // Poll until the description has text or the bound expires.
        let probe = render(
            r#"
            (() => {
                const panel = document.querySelector("__PANEL__") || document;
                const description = panel.querySelector("__DESCRIPTION__");
                return !!(description && description.innerText.trim().length);
            })();
            "#,
            &[
                ("__PANEL__", selectors.details_panel),
                ("__DESCRIPTION__", selectors.description),
            ],
        );

        let mut elapsed = Duration::ZERO;
        let mut loaded = false;
        while elapsed < self.config.details_timeout {
            if tab
                .evaluate(&probe, false)?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                loaded = true;
                break;
            }
            sleep(DETAILS_POLL_INTERVAL).await;
            elapsed += DETAILS_POLL_INTERVAL;
        }
        if !loaded {
            return Ok(None);
        }

        let description_reader = match &options.description_fn {
            Some(custom) => custom.clone(),
            None => render(
                r#"(() => {
                    const el = document.querySelector("__DESCRIPTION__");
                    return el ? el.innerText : "";
                })()"#,
                &[("__DESCRIPTION__", selectors.description)],
            ),
        };

        let details_script = render(
            r#"
            (() => {
                const panel = document.querySelector("__PANEL__") || document;
                const description = panel.querySelector("__DESCRIPTION__");
                const apply = panel.querySelector("__APPLY__");
                return JSON.stringify({
                    description: String(__READER__),
                    descriptionHtml: description ? description.outerHTML : "",
                    applyLink: apply ? apply.href : null,
                });
            })();
            "#,
            &[
                ("__PANEL__", selectors.details_panel),
                ("__DESCRIPTION__", selectors.description),
                ("__APPLY__", selectors.apply_link),
                ("__READER__", &description_reader),
            ],
        );

        let value = evaluate_json(tab, &details_script)?;
        let details: JobDetails = serde_json::from_value(value).unwrap_or_default();
        Ok(Some(details))
    }

    /// Trigger pagination and wait for the item count to grow.
    async fn load_more(
        &self,
        tab: &Arc<Tab>,
        selectors: &SelectorSet,
        previous_total: usize,
    ) -> Result<usize> {
        let trigger = render(
            r#"
            (() => {
                window.scrollTo(0, document.body.scrollHeight);
                const more = document.querySelector("__SEE_MORE__");
                if (more && !more.disabled) { more.click(); return "clicked"; }
                return "scrolled";
            })();
            "#,
            &[("__SEE_MORE__", selectors.see_more_jobs)],
        );
        tab.evaluate(&trigger, false)?;

        let count_script = render(
            r#"document.querySelectorAll("__JOBS__").length"#,
            &[("__JOBS__", selectors.jobs)],
        );

        let mut elapsed = Duration::ZERO;
        while elapsed < self.config.load_more_timeout {
            sleep(LOAD_MORE_POLL_INTERVAL).await;
            elapsed += LOAD_MORE_POLL_INTERVAL;

            let total = tab
                .evaluate(&count_script, false)?
                .value
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize;
            if total > previous_total {
                return Ok(total);
            }
        }
        Ok(previous_total)
    }
}

#[async_trait]
impl RunStrategy for AnonymousStrategy {
    async fn run(
        &self,
        tab: &Arc<Tab>,
        search_url: &Url,
        keyword: &str,
        location: &str,
        options: &ResolvedOptions,
    ) -> Result<StrategyRunResult> {
        let tag = format!("[{keyword}][{location}]");

        tab.navigate_to(search_url.as_str())?;
        tab.wait_until_navigated()?;
        self.bus.emit(Event::TargetChanged);
        sleep(self.config.slow_mo).await;

        if let Some(exit) = self.check_auth_wall(&tag, &tab.get_url()) {
            return Ok(exit);
        }

        self.accept_cookies(tab);

        let Some(selectors) = self.wait_for_container(tab) else {
            // Soft failure: skip this location, keep the run alive.
            warn!("{tag} no results container found, skipping location");
            return Ok(StrategyRunResult::CONTINUE);
        };
        debug!("{tag} using container {}", selectors.container);

        let mut tracker =
            PaginationTracker::new(options.limit, self.config.max_no_growth_attempts);
        let mut summaries = self.parse_summaries(tab, selectors)?;
        tracker.observe(summaries.len());

        let mut failed = 0usize;
        let mut missed = 0usize;

        'pagination: loop {
            // Flush every summary already read before considering load-more.
            while tracker.within_limit() && tracker.next_index() < summaries.len() {
                let index = tracker.next_index();
                let summary = summaries[index].clone();
                tracker.mark_processed();

                if summary.job_id.is_empty() || summary.link.is_empty() {
                    missed += 1;
                    continue;
                }
                if options.skip_promoted_jobs && summary.promoted {
                    debug!("{tag} skipping promoted job {}", summary.job_id);
                    missed += 1;
                    continue;
                }

                match self.load_details(tab, selectors, index, options).await {
                    Ok(Some(details)) => {
                        self.bus.emit(Event::Data(JobRecord {
                            query: keyword.to_string(),
                            location: location.to_string(),
                            job_id: summary.job_id,
                            job_index: index,
                            title: summary.title,
                            company: summary.company,
                            company_link: summary.company_link,
                            company_img_link: summary.company_img_link,
                            place: summary.place,
                            date: summary.date,
                            link: summary.link,
                            apply_link: details
                                .apply_link
                                .filter(|_| options.apply_link),
                            description: normalize(&details.description),
                            description_html: details.description_html,
                            insights: details.insights,
                            skills: None,
                        }));
                    }
                    Ok(None) => {
                        warn!("{tag} details did not load for job index {index}");
                        failed += 1;
                    }
                    Err(err) => {
                        warn!("{tag} detail extraction failed for index {index}: {err}");
                        failed += 1;
                    }
                }

                sleep(self.config.slow_mo).await;
            }

            if !tracker.within_limit() {
                info!("{tag} reached limit of {}", options.limit);
                break 'pagination;
            }

            let total = self.load_more(tab, selectors, summaries.len()).await?;
            match tracker.observe(total) {
                PaginationStep::Grew => {
                    summaries = self.parse_summaries(tab, selectors)?;
                }
                PaginationStep::Stalled => {
                    debug!("{tag} no growth after load-more, retrying");
                }
                PaginationStep::Exhausted => {
                    info!("{tag} results exhausted at {} items", summaries.len());
                    break 'pagination;
                }
            }
        }

        self.bus.emit(Event::Metrics(ScraperMetrics {
            query: keyword.to_string(),
            location: location.to_string(),
            processed: tracker.processed().saturating_sub(failed + missed),
            failed,
            missed,
            timestamp: chrono::Utc::now(),
        }));

        Ok(StrategyRunResult::CONTINUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_wall_emits_error_and_forces_exit() {
        let (bus, mut rx) = EventBus::new();
        let strategy = AnonymousStrategy::new(Arc::new(BrowserConfig::default()), bus);

        let exit = strategy.check_auth_wall(
            "[engineer][Worldwide]",
            "https://www.linkedin.com/authwall?trk=qf",
        );
        assert_eq!(exit, Some(StrategyRunResult::EXIT));
        match rx.try_recv() {
            Ok(Event::Error(message)) => assert!(message.contains("anonymous mode")),
            other => panic!("unexpected event: {other:?}"),
        }

        // A regular results URL passes silently.
        let exit = strategy.check_auth_wall(
            "[engineer][Worldwide]",
            "https://www.linkedin.com/jobs/search?keywords=engineer&start=0",
        );
        assert_eq!(exit, None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn auth_wall_urls_are_detected() {
        assert!(is_auth_wall(
            "https://www.linkedin.com/authwall?trk=qf&original_referer="
        ));
        assert!(is_auth_wall("https://www.linkedin.com/uas/login?session_redirect=x"));
        assert!(!is_auth_wall(
            "https://www.linkedin.com/jobs/search?keywords=engineer&start=0"
        ));
    }
}
