//! Browser launch configuration.
//!
//! Caller-supplied settings are merged over fixed safe defaults tuned for
//! containerized hosts: sandbox and GPU disabled, notifications muted, fixed
//! window size, English locale. The session credential is picked up from the
//! `LI_AT_COOKIE` environment variable; its presence selects the
//! authenticated strategy.

use std::env;
use std::time::Duration;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;

/// Environment variable holding the `li_at` session cookie value.
pub const LI_AT_COOKIE_ENV: &str = "LI_AT_COOKIE";

/// Default window size, matches a common laptop viewport.
const DEFAULT_WINDOW: (u32, u32) = (1472, 828);

/// Chrome flags always passed on top of what `headless_chrome` sets itself.
/// Sandboxing is governed by [`BrowserConfig::sandbox`] instead of a flag.
const DEFAULT_ARGS: &[&str] = &[
    "--enable-automation",
    "--start-maximized",
    "--lang=en-GB",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-accelerated-2d-canvas",
    "--allow-running-insecure-content",
    "--disable-web-security",
    "--disable-client-side-phishing-detection",
    "--disable-notifications",
    "--mute-audio",
];

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/123.0.0.0 Safari/537.36",
    ]
});

/// Pick a random user agent from the pool.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub sandbox: bool,
    pub window_size: (u32, u32),
    /// Delay inserted between browser actions (navigation, clicks,
    /// pagination triggers). Raise it when the site answers with 429.
    pub slow_mo: Duration,
    /// Extra Chrome flags appended after the defaults.
    pub extra_args: Vec<String>,
    /// Fixed user agent; a random one from the pool when `None`.
    pub user_agent: Option<String>,
    /// Session cookie value; selects the authenticated strategy when set.
    pub li_at_cookie: Option<String>,
    /// How long the browser connection may sit idle between CDP calls.
    pub idle_browser_timeout: Duration,
    /// Bounded wait for the results-list container.
    pub container_timeout: Duration,
    /// Bounded wait for the detail panel to populate.
    pub details_timeout: Duration,
    /// Bounded wait for concurrent initialization, polled at
    /// [`BrowserConfig::initialize_poll_interval`].
    pub initialize_timeout: Duration,
    pub initialize_poll_interval: Duration,
    /// Bounded wait for the item count to grow after a load-more trigger.
    pub load_more_timeout: Duration,
    /// Consecutive no-growth load-more attempts tolerated before giving up.
    pub max_no_growth_attempts: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            window_size: DEFAULT_WINDOW,
            slow_mo: Duration::from_millis(150),
            extra_args: Vec::new(),
            user_agent: None,
            li_at_cookie: None,
            idle_browser_timeout: Duration::from_secs(300),
            container_timeout: Duration::from_secs(10),
            details_timeout: Duration::from_secs(5),
            initialize_timeout: Duration::from_secs(10),
            initialize_poll_interval: Duration::from_millis(100),
            load_more_timeout: Duration::from_secs(10),
            max_no_growth_attempts: 2,
        }
    }
}

impl BrowserConfig {
    /// Defaults plus the session credential from the environment.
    pub fn from_env() -> Self {
        Self {
            li_at_cookie: env::var(LI_AT_COOKIE_ENV).ok().filter(|v| !v.is_empty()),
            ..Self::default()
        }
    }

    /// Full flag list handed to Chrome: defaults, window size, user agent,
    /// then caller extras so they can override anything before them.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = DEFAULT_ARGS.iter().map(|a| a.to_string()).collect();
        args.push(format!(
            "--window-size={},{}",
            self.window_size.0, self.window_size.1
        ));
        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| random_user_agent().to_string());
        args.push(format!("--user-agent={user_agent}"));
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_args_come_after_defaults() {
        let config = BrowserConfig {
            extra_args: vec!["--lang=it-IT".into()],
            ..Default::default()
        };
        let args = config.launch_args();
        let default_pos = args.iter().position(|a| a == "--lang=en-GB").unwrap();
        let extra_pos = args.iter().position(|a| a == "--lang=it-IT").unwrap();
        assert!(extra_pos > default_pos);
    }

    #[test]
    fn fixed_user_agent_wins_over_pool() {
        let config = BrowserConfig {
            user_agent: Some("test-agent".into()),
            ..Default::default()
        };
        assert!(config
            .launch_args()
            .iter()
            .any(|a| a == "--user-agent=test-agent"));
    }
}
