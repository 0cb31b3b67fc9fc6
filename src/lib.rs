//! Headless-browser scraping engine for LinkedIn job listings.
//!
//! The engine drives a Chrome instance through CDP and pushes every
//! extracted job record over an event channel; nothing is ever returned
//! from a run directly. Two extraction strategies cover the two site
//! layouts: the anonymous guest list with its infinite scroll, and the
//! authenticated layout (selected by configuring a `li_at` session cookie)
//! with offset pagination and richer card data.
//!
//! ```no_run
//! use linkedin_jobs_scraper::{
//!     BrowserConfig, Event, LinkedinScraper, Query, QueryOptions,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (scraper, mut events) = LinkedinScraper::new(BrowserConfig::from_env());
//!
//! let consumer = tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Data(job) => println!("{} @ {}", job.title, job.company),
//!             Event::End => break,
//!             _ => {}
//!         }
//!     }
//! });
//!
//! let query = Query::new("Software Engineer").with_options(QueryOptions {
//!     locations: Some(vec!["United States".into()]),
//!     limit: Some(10),
//!     ..Default::default()
//! });
//!
//! scraper.run(query, None).await?;
//! scraper.close().await;
//! consumer.await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod filters;
pub mod interceptor;
pub mod query;
pub mod scraper;
pub mod search_url;
mod selectors;
pub mod session;
pub mod strategies;

pub use config::BrowserConfig;
pub use error::{Error, Result};
pub use events::{Event, EventBus, JobRecord, ScraperMetrics};
pub use filters::{
    BaseSalary, ExperienceLevel, Filters, Industry, JobType, OnSiteOrRemote, OneOrMany, Relevance,
    TimeRange,
};
pub use query::{Query, QueryOptions, ValidationError};
pub use scraper::LinkedinScraper;
pub use search_url::build_search_url;
