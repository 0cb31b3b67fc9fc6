//! Canonical search URL construction.
//!
//! Pure and deterministic: identical inputs produce a byte-identical URL.
//! Parameters are appended only for filters that are present; multi-valued
//! filters are comma-joined into a single parameter. The trailing `start=0`
//! marks the initial pagination offset, later offsets are appended by the
//! authenticated strategy.

use once_cell::sync::Lazy;
use url::Url;

use crate::query::{company_id_param, ResolvedOptions};

pub const JOBS_SEARCH_URL: &str = "https://www.linkedin.com/jobs/search";

static BASE: Lazy<Url> = Lazy::new(|| {
    Url::parse(JOBS_SEARCH_URL).expect("static jobs search url parses")
});

pub fn build_search_url(keyword: &str, location: &str, options: &ResolvedOptions) -> Url {
    let mut url = BASE.clone();
    {
        let mut params = url.query_pairs_mut();

        if !keyword.is_empty() {
            params.append_pair("keywords", keyword);
        }

        if !location.is_empty() {
            params.append_pair("location", location);
        }

        let filters = &options.filters;

        if let Some(company_jobs_url) = &filters.company_jobs_url {
            if let Some(company_id) = company_id_param(company_jobs_url) {
                params.append_pair("f_C", &company_id);
            }
        }

        if let Some(relevance) = filters.relevance {
            params.append_pair("sortBy", relevance.as_param());
        }

        if let Some(time) = filters.time {
            params.append_pair("f_TPR", time.as_param());
        }

        if let Some(base_salary) = filters.base_salary {
            params.append_pair("f_SB2", base_salary.as_param());
        }

        if let Some(job_type) = &filters.r#type {
            params.append_pair("f_JT", &join_params(job_type.to_vec().iter().map(|v| v.as_param())));
        }

        if let Some(experience) = &filters.experience {
            params.append_pair("f_E", &join_params(experience.to_vec().iter().map(|v| v.as_param())));
        }

        if let Some(work_mode) = &filters.on_site_or_remote {
            params.append_pair("f_WT", &join_params(work_mode.to_vec().iter().map(|v| v.as_param())));
        }

        if let Some(industry) = &filters.industry {
            params.append_pair("f_I", &join_params(industry.to_vec().iter().map(|v| v.as_param())));
        }

        params.append_pair("start", "0");
    }
    url
}

fn join_params<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{ExperienceLevel, JobType, Relevance, TimeRange};
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_query_carries_only_keyword_location_and_start() {
        let url = build_search_url("Engineer", "United States", &ResolvedOptions::default());
        assert_eq!(
            url.as_str(),
            "https://www.linkedin.com/jobs/search?keywords=Engineer&location=United+States&start=0"
        );
    }

    #[test]
    fn absent_filters_add_no_parameters() {
        let url = build_search_url("", "", &ResolvedOptions::default());
        assert_eq!(url.as_str(), "https://www.linkedin.com/jobs/search?start=0");
    }

    #[test]
    fn list_filters_join_with_commas() {
        let mut options = ResolvedOptions::default();
        options.filters.r#type = Some(vec![JobType::FullTime, JobType::Contract].into());
        options.filters.experience = Some(ExperienceLevel::MidSenior.into());

        let url = build_search_url("Engineer", "", &options);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("f_JT".into(), "F,C".into())));
        assert!(pairs.contains(&("f_E".into(), "4".into())));
    }

    #[test]
    fn build_is_deterministic_and_idempotent_under_reserialization() {
        let mut options = ResolvedOptions::default();
        options.filters.relevance = Some(Relevance::Recent);
        options.filters.time = Some(TimeRange::Week);
        options.filters.company_jobs_url =
            Some("https://www.linkedin.com/jobs/search/?f_C=1441%2C10667&keywords=x".into());

        let first = build_search_url("Engineer", "Germany", &options);
        let second = build_search_url("Engineer", "Germany", &options);
        assert_eq!(first.as_str(), second.as_str());

        // Reparsing the produced URL reproduces the same filter parameters.
        let reparsed = Url::parse(first.as_str()).unwrap();
        let find = |key: &str| {
            reparsed
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        assert_eq!(find("sortBy").as_deref(), Some("DD"));
        assert_eq!(find("f_TPR").as_deref(), Some("r604800"));
        assert_eq!(find("f_C").as_deref(), Some("1441,10667"));
        assert_eq!(find("start").as_deref(), Some("0"));
    }
}
