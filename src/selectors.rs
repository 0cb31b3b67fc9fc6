//! DOM selector sets.
//!
//! Public and authenticated pages use different markup, and the public
//! search results have shipped under two generations of class names; the
//! anonymous strategy probes which container is present before extracting.

/// Selector set for one markup generation.
#[derive(Debug, Clone, Copy)]
pub struct SelectorSet {
    pub container: &'static str,
    pub jobs: &'static str,
    pub link: &'static str,
    pub title: &'static str,
    pub company: &'static str,
    pub place: &'static str,
    pub date: &'static str,
    pub details_panel: &'static str,
    pub description: &'static str,
    pub see_more_jobs: &'static str,
    pub apply_link: &'static str,
}

/// Public results, current markup.
pub const ANONYMOUS: SelectorSet = SelectorSet {
    container: ".two-pane-serp-page__results-list",
    jobs: "ul.jobs-search__results-list > li",
    link: "a.base-card__full-link",
    title: ".base-search-card__title",
    company: ".base-search-card__subtitle",
    place: ".job-search-card__location",
    date: "time",
    details_panel: ".two-pane-serp-page__detail-view",
    description: ".description__text",
    see_more_jobs: "button.infinite-scroller__show-more-button",
    apply_link: "a[data-tracking-control-name='public_jobs_apply-link-offsite']",
};

/// Public results, previous markup generation still served to some sessions.
pub const ANONYMOUS_LEGACY: SelectorSet = SelectorSet {
    container: ".results__container.results__container--two-pane",
    jobs: ".jobs-search__results-list li",
    link: "a.result-card__full-card-link",
    title: ".result-card__title",
    company: ".result-card__subtitle.job-result-card__subtitle",
    place: ".job-result-card__location",
    date: "time",
    details_panel: ".details-pane__content",
    description: ".description__text",
    see_more_jobs: "button.infinite-scroller__show-more-button",
    apply_link: "a[data-tracking-control-name='public_jobs_apply-link-offsite']",
};

/// Logged-in jobs search layout.
pub const AUTHENTICATED: SelectorSet = SelectorSet {
    container: ".scaffold-layout__list",
    jobs: "div.job-card-container",
    link: "a.job-card-container__link",
    title: ".artdeco-entity-lockup__title",
    company: ".artdeco-entity-lockup__subtitle",
    place: ".artdeco-entity-lockup__caption",
    date: "time",
    details_panel: ".jobs-search__job-details--container",
    description: ".jobs-description",
    see_more_jobs: "button.infinite-scroller__show-more-button",
    apply_link: "button.jobs-apply-button",
};

/// Top-card extras only present on authenticated pages.
pub mod authenticated_extras {
    pub const COMPANY_LINK: &str = ".job-details-jobs-unified-top-card__company-name a";
    pub const COMPANY_IMG: &str = ".jobs-unified-top-card__company-logo img, .ivm-view-attr__img-wrapper img";
    pub const INSIGHTS: &str = ".jobs-unified-top-card__job-insight, .job-details-jobs-unified-top-card__job-insight";
    pub const SKILLS: &str = ".job-details-how-you-match__skills-item-subtitle";
    pub const PROMOTED_FOOTER: &str = ".job-card-container__footer-item";
}

/// Cookie/consent banner accept buttons, tried best-effort once per page.
pub const COOKIE_ACCEPT: &str =
    "button[action-type='ACCEPT'], button[data-tracking-control-name='ga-cookie.consent.accept.v4']";
