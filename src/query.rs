//! Query model: options layering and validation.
//!
//! Options are merged from three layers (library defaults < run-level options
//! < per-query options) into a [`ResolvedOptions`]. Fields overwrite whole:
//! a `locations` list supplied at the innermost layer replaces the outer one,
//! it is never unioned element-wise.
//!
//! Validation is pure and collects every problem instead of stopping at the
//! first one; the orchestrator aborts the run on a non-empty list before any
//! browser activity.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::filters::Filters;

/// Host+path every company jobs URL must live under.
const COMPANY_JOBS_BASE: &str = "https://www.linkedin.com/jobs/search/?";

/// Sentinel location used when a query supplies none.
pub const DEFAULT_LOCATION: &str = "Worldwide";

/// Items per result page; offsets are always multiples of this.
pub const PAGE_SIZE: usize = 25;

/// One search request: an optional keyword plus options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<QueryOptions>,
}

impl Query {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            query: Some(keyword.into()),
            options: None,
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Lets `run` accept a single query where a batch is expected.
impl From<Query> for Vec<Query> {
    fn from(query: Query) -> Self {
        vec![query]
    }
}

/// Caller-facing options; every field optional so layers can be merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
    /// Number of result pages to skip before the first extraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_offset: Option<usize>,
    /// Maximum records to emit per location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Block images, stylesheets, media and fonts for speed. Can interfere
    /// with pagination on some layouts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize: Option<bool>,
    /// Also extract the external apply link where one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_link: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_promoted_jobs: Option<bool>,
    /// Also extract the skills list (authenticated sessions only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    /// JavaScript expression evaluated in the page instead of the default
    /// description reader. Must evaluate to a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_fn: Option<String>,
}

/// Fully merged options driving one query. Construction goes through
/// [`ResolvedOptions::merge`], so invariants (non-empty locations, positive
/// limit after validation) hold for the rest of the run.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub locations: Vec<String>,
    pub page_offset: usize,
    pub limit: usize,
    pub optimize: bool,
    pub apply_link: bool,
    pub skip_promoted_jobs: bool,
    pub skills: bool,
    pub filters: Filters,
    pub description_fn: Option<String>,
}

impl Default for ResolvedOptions {
    fn default() -> Self {
        Self {
            locations: vec![DEFAULT_LOCATION.to_string()],
            page_offset: 0,
            limit: 25,
            optimize: false,
            apply_link: false,
            skip_promoted_jobs: false,
            skills: false,
            filters: Filters::default(),
            description_fn: None,
        }
    }
}

impl ResolvedOptions {
    /// Merge run-level and per-query options over the library defaults.
    /// Later layers win field-wise; lists are replaced wholesale.
    pub fn merge(run_level: Option<&QueryOptions>, per_query: Option<&QueryOptions>) -> Self {
        let mut resolved = Self::default();

        for layer in [run_level, per_query].into_iter().flatten() {
            if let Some(locations) = &layer.locations {
                resolved.locations = locations.clone();
            }
            if let Some(page_offset) = layer.page_offset {
                resolved.page_offset = page_offset;
            }
            if let Some(limit) = layer.limit {
                resolved.limit = limit;
            }
            if let Some(optimize) = layer.optimize {
                resolved.optimize = optimize;
            }
            if let Some(apply_link) = layer.apply_link {
                resolved.apply_link = apply_link;
            }
            if let Some(skip) = layer.skip_promoted_jobs {
                resolved.skip_promoted_jobs = skip;
            }
            if let Some(skills) = layer.skills {
                resolved.skills = skills;
            }
            if let Some(filters) = &layer.filters {
                resolved.filters = filters.clone();
            }
            if let Some(description_fn) = &layer.description_fn {
                resolved.description_fn = Some(description_fn.clone());
            }
        }

        // An empty list would make the locations loop a no-op; fall back to
        // the sentinel.
        if resolved.locations.is_empty() {
            resolved.locations = vec![DEFAULT_LOCATION.to_string()];
        }

        resolved
    }

    /// Upper bound on pagination: offsets never go past the limit rounded up
    /// to the page size.
    pub fn pagination_max(&self) -> usize {
        self.page_offset + self.limit.div_ceil(PAGE_SIZE)
    }
}

/// One validation problem, naming the offending parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub param: String,
    pub reason: String,
}

impl ValidationError {
    fn new(param: &str, reason: impl Into<String>) -> Self {
        Self {
            param: param.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.param, self.reason)
    }
}

/// Validate one merged query. Pure; returns every problem found.
///
/// Filter vocabulary membership is enforced by the enum types in
/// [`crate::filters`], so only what the type system cannot express is checked
/// here: value ranges and the company jobs URL shape.
pub fn validate(query: &Query, options: &ResolvedOptions) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(keyword) = &query.query {
        if keyword.chars().any(|c| c.is_control()) {
            errors.push(ValidationError::new(
                "query",
                "must not contain control characters",
            ));
        }
    }

    if options.locations.iter().any(|l| l.trim().is_empty()) {
        errors.push(ValidationError::new(
            "options.locations",
            "must be non-empty strings",
        ));
    }

    if options.limit == 0 {
        errors.push(ValidationError::new(
            "options.limit",
            "must be a positive integer",
        ));
    }

    if let Some(description_fn) = &options.description_fn {
        if description_fn.trim().is_empty() {
            errors.push(ValidationError::new(
                "options.descriptionFn",
                "must be a non-empty JavaScript expression",
            ));
        }
    }

    if let Some(company_jobs_url) = &options.filters.company_jobs_url {
        match Url::parse(company_jobs_url) {
            Ok(url) => {
                let company_id = url
                    .query_pairs()
                    .find(|(k, _)| k == "f_C")
                    .map(|(_, v)| v.to_string());

                if !company_jobs_url
                    .to_lowercase()
                    .starts_with(COMPANY_JOBS_BASE)
                    || company_id.as_deref().unwrap_or("").is_empty()
                {
                    errors.push(ValidationError::new(
                        "options.filters.companyJobsUrl",
                        format!(
                            "must start with {COMPANY_JOBS_BASE} and carry a non-empty f_C parameter"
                        ),
                    ));
                }
            }
            Err(_) => {
                errors.push(ValidationError::new(
                    "options.filters.companyJobsUrl",
                    "must be a valid url",
                ));
            }
        }
    }

    errors
}

/// Extract the `f_C` company id from a validated company jobs URL.
pub(crate) fn company_id_param(company_jobs_url: &str) -> Option<String> {
    let url = Url::parse(company_jobs_url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "f_C")
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_apply_when_no_layers_given() {
        let resolved = ResolvedOptions::merge(None, None);
        assert_eq!(resolved.locations, vec![DEFAULT_LOCATION.to_string()]);
        assert_eq!(resolved.limit, 25);
        assert_eq!(resolved.page_offset, 0);
        assert!(!resolved.optimize);
    }

    #[test]
    fn inner_layer_replaces_arrays_wholesale() {
        let run_level = QueryOptions {
            locations: Some(vec!["United Kingdom".into(), "Germany".into()]),
            limit: Some(5),
            ..Default::default()
        };
        let per_query = QueryOptions {
            locations: Some(vec!["United States".into()]),
            ..Default::default()
        };

        let resolved = ResolvedOptions::merge(Some(&run_level), Some(&per_query));
        assert_eq!(resolved.locations, vec!["United States".to_string()]);
        // Non-conflicting fields fall through from the outer layer.
        assert_eq!(resolved.limit, 5);
    }

    #[test]
    fn empty_locations_normalize_to_sentinel() {
        let per_query = QueryOptions {
            locations: Some(vec![]),
            ..Default::default()
        };
        let resolved = ResolvedOptions::merge(None, Some(&per_query));
        assert_eq!(resolved.locations, vec![DEFAULT_LOCATION.to_string()]);
    }

    #[test]
    fn zero_limit_is_one_error_naming_the_field() {
        let options = ResolvedOptions {
            limit: 0,
            ..Default::default()
        };
        let errors = validate(&Query::new("engineer"), &options);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].param, "options.limit");
    }

    #[test]
    fn company_jobs_url_must_carry_company_id() {
        let mut options = ResolvedOptions::default();
        options.filters.company_jobs_url =
            Some("https://www.linkedin.com/jobs/search/?keywords=engineer".into());
        let errors = validate(&Query::default(), &options);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].param, "options.filters.companyJobsUrl");

        options.filters.company_jobs_url =
            Some("https://www.linkedin.com/jobs/search/?f_C=1441%2C10667&keywords=engineer".into());
        assert!(validate(&Query::default(), &options).is_empty());
    }

    #[test]
    fn unparseable_company_url_is_reported() {
        let mut options = ResolvedOptions::default();
        options.filters.company_jobs_url = Some("not a url".into());
        let errors = validate(&Query::default(), &options);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].reason, "must be a valid url");
    }

    #[test]
    fn all_problems_reported_together() {
        let mut options = ResolvedOptions {
            limit: 0,
            locations: vec!["  ".into()],
            ..Default::default()
        };
        options.filters.company_jobs_url = Some("not a url".into());
        let errors = validate(&Query::default(), &options);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn pagination_max_rounds_limit_up_to_page_size() {
        let options = ResolvedOptions {
            limit: 27,
            page_offset: 2,
            ..Default::default()
        };
        assert_eq!(options.pagination_max(), 4);
    }

    #[test]
    fn company_id_extraction_decodes_the_parameter() {
        let id = company_id_param(
            "https://www.linkedin.com/jobs/search/?f_C=1441%2C10667&keywords=x",
        );
        assert_eq!(id.as_deref(), Some("1441,10667"));
    }
}
