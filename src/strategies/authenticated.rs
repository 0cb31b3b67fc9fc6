//! Authenticated extraction strategy.
//!
//! Runs with a stored `li_at` session cookie attached to every request.
//! The logged-in layout paginates by `start` offsets instead of infinite
//! scroll, exposes richer top-card data (insights, company link/logo) and,
//! behind their query flags, the skills list and external apply link.
//!
//! A login or checkpoint redirect means the credential is no longer valid:
//! that is fatal for the whole run, signalled with a dedicated
//! `InvalidSession` event rather than a generic error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::Tab;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BrowserConfig;
use crate::error::Result;
use crate::events::{Event, EventBus, JobRecord, ScraperMetrics};
use crate::query::{ResolvedOptions, PAGE_SIZE};
use crate::selectors::{authenticated_extras, SelectorSet, AUTHENTICATED};

use super::{
    evaluate_json, normalize, render, selector_appears, JobDetails, JobSummary, PaginationStep,
    PaginationTracker, RunStrategy, StrategyRunResult,
};

const DETAILS_POLL_INTERVAL: Duration = Duration::from_millis(200);
const LIST_HYDRATE_PAUSE: Duration = Duration::from_millis(300);

/// `true` when navigation was redirected to a login or checkpoint page.
pub(crate) fn is_login_wall(url: &str) -> bool {
    url.contains("/login") || url.contains("/checkpoint") || url.contains("linkedin.com/authwall")
}

pub struct AuthenticatedStrategy {
    config: Arc<BrowserConfig>,
    bus: EventBus,
    cookie: String,
}

impl AuthenticatedStrategy {
    pub fn new(config: Arc<BrowserConfig>, bus: EventBus, cookie: String) -> Self {
        Self {
            config,
            bus,
            cookie,
        }
    }

    /// Attach the session cookie to every request from this page. Must run
    /// before the first navigation.
    fn attach_session(&self, tab: &Arc<Tab>) -> Result<()> {
        let cookie_header = format!("li_at={}", self.cookie);
        let mut headers = HashMap::new();
        headers.insert("Cookie", cookie_header.as_str());
        tab.set_extra_http_headers(headers)?;
        Ok(())
    }

    /// Session check run after every navigation. A login or checkpoint
    /// redirect means the cookie was rejected; the invalid-session signal is
    /// emitted and `Some(EXIT)` tells the orchestrator to abandon the run
    /// without entering the pagination loop.
    fn check_session(&self, tag: &str, url: &str) -> Option<StrategyRunResult> {
        if is_login_wall(url) {
            warn!("{tag} session cookie rejected, terminating run");
            self.bus.emit(Event::InvalidSession);
            return Some(StrategyRunResult::EXIT);
        }
        None
    }

    /// Scroll the job list so lazy cards hydrate, then snapshot summaries.
    fn snapshot_cards(&self, tab: &Arc<Tab>, selectors: &SelectorSet) -> Result<Vec<JobSummary>> {
        let script = render(
            r#"
            (() => {
                const list = document.querySelector("__CONTAINER__");
                if (list) list.scrollTop = list.scrollHeight;

                const cards = Array.from(document.querySelectorAll("__JOBS__"));
                const summaries = cards.map(card => {
                    const pick = sel => {
                        const el = card.querySelector(sel);
                        return el ? el.innerText.trim() : "";
                    };
                    const jobId = card.getAttribute("data-job-id") || "";
                    const time = card.querySelector("__DATE__");
                    const promoted = Array.from(card.querySelectorAll("__FOOTER__"))
                        .some(el => el.innerText.trim().toLowerCase() === "promoted");
                    return {
                        jobId: jobId,
                        title: pick("__TITLE__"),
                        company: pick("__COMPANY__"),
                        place: pick("__PLACE__"),
                        date: time ? (time.getAttribute("datetime") || "") : "",
                        link: jobId ? "https://www.linkedin.com/jobs/view/" + jobId + "/" : "",
                        promoted: promoted,
                    };
                });
                return JSON.stringify(summaries);
            })();
            "#,
            &[
                ("__CONTAINER__", selectors.container),
                ("__JOBS__", selectors.jobs),
                ("__DATE__", selectors.date),
                ("__TITLE__", selectors.title),
                ("__COMPANY__", selectors.company),
                ("__PLACE__", selectors.place),
                ("__FOOTER__", authenticated_extras::PROMOTED_FOOTER),
            ],
        );

        let value = evaluate_json(tab, &script)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// Click the card at `index`, wait for the panel, read the rich fields.
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
                card.scrollIntoView({block: "center"});
                const link = card.querySelector("__LINK__") || card;
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

        let probe = render(
            r#"
            (() => {
                const description = document.querySelector("__DESCRIPTION__");
                return !!(description && description.innerText.trim().length);
            })();
            "#,
            &[("__DESCRIPTION__", selectors.description)],
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
                const description = document.querySelector("__DESCRIPTION__");
                const companyAnchor = document.querySelector("__COMPANY_LINK__");
                const companyImg = document.querySelector("__COMPANY_IMG__");
                const insights = Array.from(document.querySelectorAll("__INSIGHTS__"))
                    .map(el => el.innerText.replace(/[\s\n\r]+/g, " ").trim())
                    .filter(t => t.length);
                const wantSkills = __WANT_SKILLS__;
                const skills = wantSkills
                    ? Array.from(document.querySelectorAll("__SKILLS__"))
                        .flatMap(el => el.innerText.split(","))
                        .map(s => s.trim())
                        .filter(s => s.length)
                    : null;
                const wantApply = __WANT_APPLY__;
                let applyLink = null;
                if (wantApply) {
                    const applyBtn = document.querySelector("__APPLY__");
                    const href = applyBtn ? (applyBtn.getAttribute("data-live-url") || applyBtn.getAttribute("href")) : null;
                    if (href) applyLink = new URL(href, document.baseURI).href;
                }
                return JSON.stringify({
                    description: String(__READER__),
                    descriptionHtml: description ? description.outerHTML : "",
                    insights: insights,
                    skills: skills,
                    applyLink: applyLink,
                    companyLink: companyAnchor ? companyAnchor.href : null,
                    companyImgLink: companyImg ? (companyImg.getAttribute("src") || null) : null,
                });
            })();
            "#,
            &[
                ("__DESCRIPTION__", selectors.description),
                ("__COMPANY_LINK__", authenticated_extras::COMPANY_LINK),
                ("__COMPANY_IMG__", authenticated_extras::COMPANY_IMG),
                ("__INSIGHTS__", authenticated_extras::INSIGHTS),
                ("__SKILLS__", authenticated_extras::SKILLS),
                ("__APPLY__", selectors.apply_link),
                ("__WANT_SKILLS__", if options.skills { "true" } else { "false" }),
                ("__WANT_APPLY__", if options.apply_link { "true" } else { "false" }),
                ("__READER__", &description_reader),
            ],
        );

        let value = evaluate_json(tab, &details_script)?;
        let details: JobDetails = serde_json::from_value(value).unwrap_or_default();
        Ok(Some(details))
    }

    /// Navigate to the page at `offset` jobs into the result set,
    /// replacing the `start` parameter of the canonical search URL.
    async fn goto_offset(&self, tab: &Arc<Tab>, search_url: &Url, offset: usize) -> Result<()> {
        let mut url = search_url.clone();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "start")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut params = url.query_pairs_mut();
            params.clear();
            for (k, v) in &pairs {
                params.append_pair(k, v);
            }
            params.append_pair("start", &offset.to_string());
        }
        tab.navigate_to(url.as_str())?;
        tab.wait_until_navigated()?;
        self.bus.emit(Event::TargetChanged);
        sleep(self.config.slow_mo).await;
        Ok(())
    }
}

#[async_trait]
impl RunStrategy for AuthenticatedStrategy {
    async fn run(
        &self,
        tab: &Arc<Tab>,
        search_url: &Url,
        keyword: &str,
        location: &str,
        options: &ResolvedOptions,
    ) -> Result<StrategyRunResult> {
        let tag = format!("[{keyword}][{location}]");
        let selectors = &AUTHENTICATED;

        self.attach_session(tab)?;

        // Offsets are bounded by the limit rounded up to the page size;
        // `start` never goes past `pagination_max` pages.
        let first_page = options.page_offset;
        let last_page = options.pagination_max();

        self.goto_offset(tab, search_url, first_page * PAGE_SIZE).await?;

        if let Some(exit) = self.check_session(&tag, &tab.get_url()) {
            return Ok(exit);
        }

        if !selector_appears(tab, selectors.container, self.config.container_timeout) {
            // The wall can also show up without a redirect.
            if let Some(exit) = self.check_session(&tag, &tab.get_url()) {
                return Ok(exit);
            }
            warn!("{tag} no results container found, skipping location");
            return Ok(StrategyRunResult::CONTINUE);
        }

        let mut tracker =
            PaginationTracker::new(options.limit, self.config.max_no_growth_attempts);
        let mut failed = 0usize;
        let mut missed = 0usize;
        let mut seen_total = 0usize;

        'pages: for page in first_page..last_page {
            if page > first_page {
                self.goto_offset(tab, search_url, page * PAGE_SIZE).await?;

                // The session can also die mid-pagination.
                if let Some(exit) = self.check_session(&tag, &tab.get_url()) {
                    return Ok(exit);
                }
                if !selector_appears(tab, selectors.container, self.config.container_timeout) {
                    warn!("{tag} container missing on page {page}, stopping pagination");
                    break 'pages;
                }
            }

            sleep(LIST_HYDRATE_PAUSE).await;
            let summaries = self.snapshot_cards(tab, selectors)?;
            debug!("{tag} page {page}: {} cards", summaries.len());

            seen_total += summaries.len();
            if let PaginationStep::Exhausted = tracker.observe(seen_total) {
                info!("{tag} results exhausted after {} items", seen_total);
                break 'pages;
            }

            let page_base = tracker.next_index();
            for (card_index, summary) in summaries.iter().enumerate() {
                if !tracker.within_limit() {
                    break;
                }
                let job_index = page_base + card_index;
                tracker.mark_processed();

                if summary.job_id.is_empty() {
                    missed += 1;
                    continue;
                }
                if options.skip_promoted_jobs && summary.promoted {
                    debug!("{tag} skipping promoted job {}", summary.job_id);
                    missed += 1;
                    continue;
                }

                match self.load_details(tab, selectors, card_index, options).await {
                    Ok(Some(details)) => {
                        self.bus.emit(Event::Data(JobRecord {
                            query: keyword.to_string(),
                            location: location.to_string(),
                            job_id: summary.job_id.clone(),
                            job_index,
                            title: summary.title.clone(),
                            company: summary.company.clone(),
                            company_link: details.company_link,
                            company_img_link: details.company_img_link,
                            place: summary.place.clone(),
                            date: summary.date.clone(),
                            link: summary.link.clone(),
                            apply_link: details.apply_link,
                            description: normalize(&details.description),
                            description_html: details.description_html,
                            insights: details.insights,
                            skills: details.skills,
                        }));
                    }
                    Ok(None) => {
                        warn!("{tag} details did not load for job {}", summary.job_id);
                        failed += 1;
                    }
                    Err(err) => {
                        warn!("{tag} detail extraction failed for job {}: {err}", summary.job_id);
                        failed += 1;
                    }
                }

                sleep(self.config.slow_mo).await;
            }

            self.bus.emit(Event::Metrics(ScraperMetrics {
                query: keyword.to_string(),
                location: location.to_string(),
                processed: tracker.processed().saturating_sub(failed + missed),
                failed,
                missed,
                timestamp: chrono::Utc::now(),
            }));

            if !tracker.within_limit() {
                info!("{tag} reached limit of {}", options.limit);
                break 'pages;
            }
        }

        Ok(StrategyRunResult::CONTINUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> (AuthenticatedStrategy, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let (bus, rx) = EventBus::new();
        let strategy =
            AuthenticatedStrategy::new(Arc::new(BrowserConfig::default()), bus, "cookie".into());
        (strategy, rx)
    }

    #[test]
    fn login_redirect_emits_invalid_session_and_forces_exit() {
        let (strategy, mut rx) = strategy();

        let exit = strategy.check_session(
            "[engineer][Worldwide]",
            "https://www.linkedin.com/checkpoint/challenge/x",
        );
        assert_eq!(exit, Some(StrategyRunResult::EXIT));
        assert!(matches!(rx.try_recv(), Ok(Event::InvalidSession)));
    }

    #[test]
    fn live_session_passes_the_check_silently() {
        let (strategy, mut rx) = strategy();

        let exit = strategy.check_session(
            "[engineer][Worldwide]",
            "https://www.linkedin.com/jobs/search?keywords=engineer&start=25",
        );
        assert_eq!(exit, None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn login_and_checkpoint_redirects_are_detected() {
        assert!(is_login_wall("https://www.linkedin.com/login?session_redirect=x"));
        assert!(is_login_wall("https://www.linkedin.com/checkpoint/challenge/x"));
        assert!(is_login_wall("https://www.linkedin.com/authwall?x=1"));
        assert!(!is_login_wall(
            "https://www.linkedin.com/jobs/search?keywords=engineer&start=25"
        ));
    }

    #[test]
    fn offsets_stay_within_the_limit_bound() {
        let options = ResolvedOptions {
            limit: 27,
            page_offset: 1,
            ..Default::default()
        };
        // Pages 1 and 2 only: start offsets 25 and 50, never past
        // ceil(27/25)=2 pages beyond the offset.
        let pages: Vec<usize> = (options.page_offset..options.pagination_max()).collect();
        assert_eq!(pages, vec![1, 2]);
        assert!(pages.iter().all(|p| p * PAGE_SIZE <= 50));
    }
}
