//! Session/browser manager.
//!
//! Owns the single [`Browser`] handle for the whole scraper. Initialization
//! is guarded by a three-state machine so that a second caller arriving
//! while a launch is in flight polls for completion instead of spawning a
//! second browser. `close` is idempotent and always leaves the manager in
//! `NotInitialized`, whatever happened to the browser process.

use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotInitialized,
    Initializing,
    Initialized,
}

pub struct SessionManager {
    config: Arc<BrowserConfig>,
    bus: EventBus,
    state: Mutex<SessionState>,
    browser: Mutex<Option<Browser>>,
}

impl SessionManager {
    pub fn new(config: Arc<BrowserConfig>, bus: EventBus) -> Self {
        Self {
            config,
            bus,
            state: Mutex::new(SessionState::NotInitialized),
            browser: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock")
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("session state lock") = state;
    }

    /// Make sure exactly one browser is running.
    ///
    /// The first caller moves `NotInitialized -> Initializing`, launches and
    /// moves to `Initialized`. Callers that observe `Initializing` poll at a
    /// fixed interval up to a hard bound and then fail with
    /// [`Error::InitializeTimeout`].
    pub async fn ensure_initialized(&self) -> Result<()> {
        let must_launch = {
            let mut state = self.state.lock().expect("session state lock");
            match *state {
                SessionState::Initialized => return Ok(()),
                SessionState::Initializing => false,
                SessionState::NotInitialized => {
                    *state = SessionState::Initializing;
                    true
                }
            }
        };

        if must_launch {
            match self.launch() {
                Ok(browser) => {
                    *self.browser.lock().expect("browser lock") = Some(browser);
                    self.set_state(SessionState::Initialized);
                    info!("browser initialized");
                    return Ok(());
                }
                Err(err) => {
                    self.set_state(SessionState::NotInitialized);
                    return Err(err);
                }
            }
        }

        // Another caller is launching; poll for completion.
        let timeout = self.config.initialize_timeout;
        let interval = self.config.initialize_poll_interval;
        let mut elapsed = Duration::ZERO;

        while self.state() != SessionState::Initialized {
            if elapsed >= timeout {
                return Err(Error::InitializeTimeout(timeout));
            }
            sleep(interval).await;
            elapsed += interval;
        }

        Ok(())
    }

    fn launch(&self) -> Result<Browser> {
        let owned_args = self.config.launch_args();
        info!(args = ?owned_args, headless = self.config.headless, "launching browser");
        let args: Vec<&OsStr> = owned_args.iter().map(|a| OsStr::new(a.as_str())).collect();

        let options = LaunchOptions {
            headless: self.config.headless,
            sandbox: self.config.sandbox,
            window_size: Some(self.config.window_size),
            idle_browser_timeout: self.config.idle_browser_timeout,
            args,
            ..Default::default()
        };

        Ok(Browser::new(options)?)
    }

    /// Open a new page. The browser handle never leaves this manager.
    pub fn new_page(&self) -> Result<Arc<Tab>> {
        let browser = self.browser.lock().expect("browser lock");
        let browser = browser
            .as_ref()
            .ok_or_else(|| Error::Browser(anyhow!("browser not initialized")))?;
        let tab = browser.new_tab()?;
        self.bus.emit(Event::TargetCreated);
        Ok(tab)
    }

    /// Close a page opened through [`SessionManager::new_page`].
    pub fn close_page(&self, tab: &Arc<Tab>) {
        if let Err(err) = tab.close(false) {
            warn!(error = %err, "failed to close page");
        }
        self.bus.emit(Event::TargetDestroyed);
    }

    /// Tear the browser down. Idempotent; the state is reset to
    /// `NotInitialized` unconditionally so a later run can retry cleanly.
    pub async fn close(&self) {
        let browser = self.browser.lock().expect("browser lock").take();
        self.set_state(SessionState::NotInitialized);

        if let Some(browser) = browser {
            // Dropping the handle kills the child process.
            drop(browser);
            self.bus.emit(Event::Disconnected);
            info!("browser closed");
        }
    }
}

#[cfg(test)]
impl SessionManager {
    fn set_state_for_test(&self, state: SessionState) {
        self.set_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: BrowserConfig) -> Arc<SessionManager> {
        let (bus, _rx) = EventBus::new();
        Arc::new(SessionManager::new(Arc::new(config), bus))
    }

    #[tokio::test]
    async fn waiter_reuses_the_launch_in_flight() {
        let manager = manager(BrowserConfig::default());
        manager.set_state_for_test(SessionState::Initializing);

        let flipper = manager.clone();
        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(300)).await;
            flipper.set_state_for_test(SessionState::Initialized);
        });

        // Observes Initializing, polls, and returns without launching a
        // second browser (no browser handle is ever created here).
        manager.ensure_initialized().await.unwrap();
        assert_eq!(manager.state(), SessionState::Initialized);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn poll_past_bound_is_a_distinct_timeout_error() {
        let manager = manager(BrowserConfig {
            initialize_timeout: Duration::from_millis(200),
            initialize_poll_interval: Duration::from_millis(50),
            ..Default::default()
        });
        manager.set_state_for_test(SessionState::Initializing);

        let err = manager.ensure_initialized().await.unwrap_err();
        assert!(matches!(err, Error::InitializeTimeout(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent_without_a_browser() {
        let manager = manager(BrowserConfig::default());
        manager.close().await;
        manager.close().await;
        assert_eq!(manager.state(), SessionState::NotInitialized);
    }

    #[tokio::test]
    async fn close_resets_state_from_any_point() {
        let manager = manager(BrowserConfig::default());
        manager.set_state_for_test(SessionState::Initialized);
        manager.close().await;
        assert_eq!(manager.state(), SessionState::NotInitialized);
    }
}
