//! The per-user page session: one headless Chrome process, one page, one
//! account.
//!
//! A [`PageSession`] is handed out by the manager and drives the site through
//! a small set of primitives. Every interaction strips the consent overlay
//! first and locates elements with a two-stage wait: a short wait for
//! visibility, then a longer fallback wait for mere DOM presence. The
//! fallback covers elements that exist but have not been laid out yet.
//!
//! After `shutdown` the only valid call is another `shutdown`; everything
//! else returns [`SessionError::Closed`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};

use crate::browser::{LaunchPlan, SessionCreationError};
use crate::config::AutomationConfig;
use crate::dom_scripts;
use crate::logging::AutomationLogger;
use crate::manager::{ManagedSession, SessionFactory};

/// Text of the account-menu entry point on the home page.
const ACCOUNT_MENU_TEXT: &str = "Mein Konto";
/// Credential fields and submit button of the login form.
const EMAIL_FIELD: &str = "#login_email_username";
const PASSWORD_FIELD: &str = "#login_password";
const SUBMIT_BUTTON: &str = "#login_submit";
/// Inline error node the site renders on rejected credentials.
const LOGIN_ERROR_NODE: &str = "#login_basic .alert-danger";

/// Poll cadence for element waits.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Upper bound on waiting for the Chrome child after closing the connection.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// How a session locates an element on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// CSS selector, resolved through the browser's query engine.
    Css(String),
    /// Any element whose text content contains the given string.
    Text(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text(text.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css '{selector}'"),
            Locator::Text(text) => write!(f, "text '{text}'"),
        }
    }
}

/// Errors surfaced by session operations. Login rejection is not an error;
/// `login` reports it as `Ok(false)`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("element not found: {locator}")]
    ElementNotFound { locator: Locator },
    #[error("element {locator} refused interaction: {reason}")]
    Interaction { locator: Locator, reason: String },
    #[error("session is closed")]
    Closed,
    #[error("browser protocol failure: {0}")]
    Cdp(String),
}

fn cdp_error(err: impl fmt::Display) -> SessionError {
    SessionError::Cdp(err.to_string())
}

/// Classification returned by the DOM probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementState {
    Visible,
    Present,
    Missing,
}

fn parse_element_state(value: Option<&Value>) -> ElementState {
    match value.and_then(Value::as_str) {
        Some("visible") => ElementState::Visible,
        Some("present") => ElementState::Present,
        _ => ElementState::Missing,
    }
}

fn probe_script(locator: &Locator) -> String {
    match locator {
        Locator::Css(selector) => dom_scripts::probe_css(selector),
        Locator::Text(text) => dom_scripts::probe_text(text),
    }
}

/// Owned probe so wait loops can poll without borrowing the session.
async fn probe_state(page: Page, script: String) -> Result<ElementState, SessionError> {
    let result = page.evaluate(script).await.map_err(cdp_error)?;
    Ok(parse_element_state(result.value()))
}

/// Poll `probe` until it yields a hit or `limit` elapses. The probe always
/// runs at least once, so a zero limit still observes the current state.
async fn wait_until<F, Fut, T>(limit: Duration, mut probe: F) -> Result<Option<T>, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, SessionError>>,
{
    let deadline = Instant::now() + limit;
    loop {
        if let Some(hit) = probe().await? {
            return Ok(Some(hit));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// An element resolved by [`PageSession::find`], ready to act on.
#[derive(Debug)]
pub enum FoundElement {
    Css { element: Element, locator: Locator },
    Text { page: Page, locator: Locator },
}

impl FoundElement {
    pub fn locator(&self) -> &Locator {
        match self {
            FoundElement::Css { locator, .. } => locator,
            FoundElement::Text { locator, .. } => locator,
        }
    }

    pub async fn click(&self) -> Result<(), SessionError> {
        match self {
            FoundElement::Css { element, locator } => {
                element
                    .click()
                    .await
                    .map_err(|err| SessionError::Interaction {
                        locator: locator.clone(),
                        reason: err.to_string(),
                    })?;
                Ok(())
            }
            FoundElement::Text { page, locator } => {
                let text = match locator {
                    Locator::Text(text) => text,
                    Locator::Css(_) => unreachable!("text variant holds a text locator"),
                };
                let result = page
                    .evaluate(dom_scripts::click_text(text))
                    .await
                    .map_err(cdp_error)?;
                match result.value().and_then(Value::as_bool) {
                    Some(true) => Ok(()),
                    _ => Err(SessionError::Interaction {
                        locator: locator.clone(),
                        reason: "element disappeared before click".to_string(),
                    }),
                }
            }
        }
    }

    pub async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        match self {
            FoundElement::Css { element, locator } => {
                element
                    .focus()
                    .await
                    .map_err(|err| SessionError::Interaction {
                        locator: locator.clone(),
                        reason: err.to_string(),
                    })?;
                element
                    .type_str(text)
                    .await
                    .map_err(|err| SessionError::Interaction {
                        locator: locator.clone(),
                        reason: err.to_string(),
                    })?;
                Ok(())
            }
            FoundElement::Text { locator, .. } => Err(SessionError::Interaction {
                locator: locator.clone(),
                reason: "typing requires a css locator".to_string(),
            }),
        }
    }
}

/// Timing and target knobs a session needs, snapshotted from the
/// configuration at creation time.
#[derive(Debug, Clone)]
struct SessionOptions {
    base_url: String,
    short_wait: Duration,
    long_wait: Duration,
    settle_delay: Duration,
    screenshot_dir: Option<PathBuf>,
}

impl SessionOptions {
    fn from_config(config: &AutomationConfig) -> Self {
        SessionOptions {
            base_url: config.base_url.clone(),
            short_wait: config.short_wait(),
            long_wait: config.long_wait(),
            settle_delay: config.settle_delay(),
            screenshot_dir: config.screenshot_dir.clone(),
        }
    }
}

struct SessionState {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    user_data_dir: Option<PathBuf>,
}

/// Stateful handle to one headless Chrome tab bound to one user account.
pub struct PageSession {
    user_id: String,
    opts: SessionOptions,
    logger: Arc<AutomationLogger>,
    state: tokio::sync::Mutex<Option<SessionState>>,
    account_name: std::sync::Mutex<Option<String>>,
}

impl fmt::Debug for PageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSession")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl PageSession {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Display name cached by the last successful login, if any.
    pub fn account_name(&self) -> Option<String> {
        self.account_name.lock().ok().and_then(|name| name.clone())
    }

    async fn page(&self) -> Result<Page, SessionError> {
        let guard = self.state.lock().await;
        guard
            .as_ref()
            .map(|state| state.page.clone())
            .ok_or(SessionError::Closed)
    }

    async fn strip_overlay(&self, page: &Page) -> Result<(), SessionError> {
        page.evaluate(dom_scripts::REMOVE_CONSENT_OVERLAY)
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn probe(&self, page: &Page, locator: &Locator) -> Result<ElementState, SessionError> {
        probe_state(page.clone(), probe_script(locator)).await
    }

    /// Load `url` and strip the consent overlay that covers fresh pages.
    pub async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let page = self.page().await?;
        page.goto(url).await.map_err(cdp_error)?;
        self.strip_overlay(&page).await?;
        self.logger.debug(
            format!("navigated to {url}"),
            Some("session"),
            Some(serde_json::json!({ "user_id": self.user_id })),
        );
        Ok(())
    }

    /// Locate an element. Waits up to `wait` for visibility, then falls back
    /// to a longer wait for DOM presence before giving up.
    pub async fn find(&self, locator: &Locator, wait: Duration) -> Result<FoundElement, SessionError> {
        let page = self.page().await?;
        self.strip_overlay(&page).await?;
        let script = probe_script(locator);

        let visible = wait_until(wait, || {
            let page = page.clone();
            let script = script.clone();
            async move {
                match probe_state(page, script).await? {
                    ElementState::Visible => Ok(Some(())),
                    _ => Ok(None),
                }
            }
        })
        .await?;

        let resolved = if visible.is_some() {
            true
        } else {
            wait_until(self.opts.long_wait, || {
                let page = page.clone();
                let script = script.clone();
                async move {
                    match probe_state(page, script).await? {
                        ElementState::Missing => Ok(None),
                        _ => Ok(Some(())),
                    }
                }
            })
            .await?
            .is_some()
        };

        if !resolved {
            return Err(SessionError::ElementNotFound {
                locator: locator.clone(),
            });
        }

        match locator {
            Locator::Css(selector) => {
                let element = page.find_element(selector.as_str()).await.map_err(|_| {
                    SessionError::ElementNotFound {
                        locator: locator.clone(),
                    }
                })?;
                Ok(FoundElement::Css {
                    element,
                    locator: locator.clone(),
                })
            }
            Locator::Text(_) => Ok(FoundElement::Text {
                page,
                locator: locator.clone(),
            }),
        }
    }

    /// Strip the overlay, let the page settle, then click the element.
    pub async fn click(&self, locator: &Locator) -> Result<(), SessionError> {
        let page = self.page().await?;
        self.strip_overlay(&page).await?;
        sleep(self.opts.settle_delay).await;
        let element = self.find(locator, self.opts.short_wait).await?;
        element.click().await
    }

    /// Strip the overlay, let the page settle, then type into the element.
    pub async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), SessionError> {
        let page = self.page().await?;
        self.strip_overlay(&page).await?;
        sleep(self.opts.settle_delay).await;
        let element = self.find(locator, self.opts.short_wait).await?;
        element.type_text(text).await
    }

    /// Run the site's login flow. Returns `Ok(false)` when the site rejects
    /// the credentials; errors are reserved for automation failures.
    ///
    /// A screenshot is captured after submission regardless of outcome when
    /// a screenshot directory is configured.
    pub async fn login(&self, email: &str, password: &str) -> Result<bool, SessionError> {
        let base_url = self.opts.base_url.clone();
        self.navigate(&base_url).await?;
        self.click(&Locator::text(ACCOUNT_MENU_TEXT)).await?;
        self.type_text(&Locator::css(EMAIL_FIELD), email).await?;
        self.type_text(&Locator::css(PASSWORD_FIELD), password).await?;
        self.click(&Locator::css(SUBMIT_BUTTON)).await?;
        sleep(self.opts.settle_delay).await;

        let page = self.page().await?;
        self.capture_login_screenshot(&page).await;
        self.strip_overlay(&page).await?;

        let error_state = self
            .probe(&page, &Locator::css(LOGIN_ERROR_NODE))
            .await?;
        if error_state == ElementState::Visible {
            self.logger.info(
                "login rejected by the site",
                Some("login"),
                Some(serde_json::json!({ "user_id": self.user_id })),
            );
            return Ok(false);
        }

        let display_name = email.split('@').next().unwrap_or(email).to_string();
        if let Ok(mut cached) = self.account_name.lock() {
            *cached = Some(display_name);
        }
        self.logger.info(
            "login succeeded",
            Some("login"),
            Some(serde_json::json!({ "user_id": self.user_id })),
        );
        Ok(true)
    }

    /// Whether the site still considers this session authenticated. The
    /// account menu shows a login prompt with a username field when it does
    /// not; absence of that field means authenticated.
    pub async fn is_authenticated(&self) -> Result<bool, SessionError> {
        let base_url = self.opts.base_url.clone();
        self.navigate(&base_url).await?;
        self.click(&Locator::text(ACCOUNT_MENU_TEXT)).await?;

        let page = self.page().await?;
        let script = probe_script(&Locator::css(EMAIL_FIELD));
        let prompt = wait_until(self.opts.short_wait, || {
            let page = page.clone();
            let script = script.clone();
            async move {
                match probe_state(page, script).await? {
                    ElementState::Missing => Ok(None),
                    _ => Ok(Some(())),
                }
            }
        })
        .await?;
        Ok(prompt.is_none())
    }

    async fn capture_login_screenshot(&self, page: &Page) {
        let Some(dir) = &self.opts.screenshot_dir else {
            return;
        };
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            self.logger.error(
                format!("could not create screenshot directory: {err}"),
                Some("login"),
                None,
            );
            return;
        }
        let path = dir.join(screenshot_file_name(&self.user_id));
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        if let Err(err) = page.save_screenshot(params, &path).await {
            self.logger.error(
                format!("login screenshot failed: {err}"),
                Some("login"),
                Some(serde_json::json!({ "user_id": self.user_id })),
            );
        }
    }
}

fn path_slug(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Audit artifact name; user ids can contain characters unfit for paths.
fn screenshot_file_name(user_id: &str) -> String {
    format!("login_{}.png", path_slug(user_id))
}

/// Unique throwaway Chrome profile directory for one session.
fn fresh_profile_dir(user_id: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("wg-automat-{}-{nanos}", path_slug(user_id)))
}

#[async_trait]
impl ManagedSession for PageSession {
    /// Tear the browser down. Safe to call repeatedly; failures degrade to
    /// log entries because the process is going away regardless.
    async fn shutdown(&self) {
        let state = {
            let mut guard = self.state.lock().await;
            guard.take()
        };
        let Some(mut state) = state else {
            return;
        };

        if let Err(err) = state.browser.close().await {
            self.logger.error(
                format!("browser close failed: {err}"),
                Some("session"),
                Some(serde_json::json!({ "user_id": self.user_id })),
            );
        }
        let _ = timeout(SHUTDOWN_WAIT, state.browser.wait()).await;
        state.handler.abort();

        if let Some(dir) = state.user_data_dir {
            if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                self.logger.debug(
                    format!("could not remove profile dir {}: {err}", dir.display()),
                    Some("session"),
                    None,
                );
            }
        }

        self.logger.info(
            "session shut down",
            Some("session"),
            Some(serde_json::json!({ "user_id": self.user_id })),
        );
    }
}

/// Creates real Chrome-backed sessions for the manager.
pub struct ChromeSessionFactory {
    config: AutomationConfig,
    logger: Arc<AutomationLogger>,
}

impl ChromeSessionFactory {
    pub fn new(config: AutomationConfig) -> Self {
        let logger = Arc::new(AutomationLogger::new(config.verbose));
        Self { config, logger }
    }

    pub fn with_logger(config: AutomationConfig, logger: Arc<AutomationLogger>) -> Self {
        Self { config, logger }
    }

    pub fn logger(&self) -> Arc<AutomationLogger> {
        Arc::clone(&self.logger)
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    type Session = PageSession;

    async fn create(&self, user_id: &str) -> Result<PageSession, SessionCreationError> {
        let user_data_dir = fresh_profile_dir(user_id);
        tokio::fs::create_dir_all(&user_data_dir)
            .await
            .map_err(|err| SessionCreationError::Launch(err.to_string()))?;

        let plan = LaunchPlan::from_config(&self.config)
            .with_user_data_dir(user_data_dir.clone());
        let browser_config = plan.to_browser_config()?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| SessionCreationError::Launch(err.to_string()))?;

        let handler_logger = Arc::clone(&self.logger);
        let handler_task = tokio::spawn(async move {
            while let Some(result) = handler.next().await {
                if let Err(err) = result {
                    handler_logger.debug(
                        format!("browser event loop error: {err}"),
                        Some("session"),
                        None,
                    );
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close().await;
                handler_task.abort();
                let _ = tokio::fs::remove_dir_all(&user_data_dir).await;
                return Err(SessionCreationError::Page(err.to_string()));
            }
        };

        self.logger.info(
            "browser session created",
            Some("session"),
            Some(serde_json::json!({ "user_id": user_id })),
        );

        Ok(PageSession {
            user_id: user_id.to_string(),
            opts: SessionOptions::from_config(&self.config),
            logger: Arc::clone(&self.logger),
            state: tokio::sync::Mutex::new(Some(SessionState {
                browser,
                handler: handler_task,
                page,
                user_data_dir: Some(user_data_dir),
            })),
            account_name: std::sync::Mutex::new(None),
        })
    }
}
