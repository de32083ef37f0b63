//! Browser launch planning.
//!
//! Transforms the high-level configuration into a strongly-typed launch plan
//! and, from there, into a `chromiumoxide::BrowserConfig`. Keeping the plan
//! as its own value makes the flag set inspectable in tests without spawning
//! a browser.

use std::path::PathBuf;

use chromiumoxide::browser::BrowserConfig;
use thiserror::Error;

use crate::config::AutomationConfig;

/// Flags applied to every launch. `--disable-dev-shm-usage` and
/// `--disable-gpu` keep Chrome stable in containers;
/// `--disable-blink-features=AutomationControlled` hides the most common
/// automation fingerprint; `--log-level=3` silences Chrome's own stderr spam.
const FIXED_ARGS: [&str; 4] = [
    "--log-level=3",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-blink-features=AutomationControlled",
];

/// Error surfaced while creating a session for a user.
#[derive(Debug, Error)]
pub enum SessionCreationError {
    #[error("user id must not be empty")]
    InvalidUserId,
    #[error("invalid browser configuration: {0}")]
    Config(String),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to open initial page: {0}")]
    Page(String),
}

/// Normalised launch plan derived from an [`AutomationConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub chrome_executable: Option<PathBuf>,
    /// Profile directory for this launch. Every session needs its own, or
    /// Chrome's process singleton refuses the second launch.
    pub user_data_dir: Option<PathBuf>,
    pub args: Vec<String>,
}

impl LaunchPlan {
    pub fn from_config(config: &AutomationConfig) -> Self {
        LaunchPlan {
            headless: config.headless,
            window_width: config.window_width,
            window_height: config.window_height,
            chrome_executable: config.chrome_executable.clone(),
            user_data_dir: None,
            args: FIXED_ARGS.iter().map(|arg| (*arg).to_string()).collect(),
        }
    }

    pub fn with_user_data_dir(mut self, dir: PathBuf) -> Self {
        self.user_data_dir = Some(dir);
        self
    }

    /// Translate the plan into a chromiumoxide launch configuration.
    pub fn to_browser_config(&self) -> Result<BrowserConfig, SessionCreationError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(self.window_width, self.window_height)
            .args(self.args.clone());

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = &self.user_data_dir {
            builder = builder.user_data_dir(dir);
        }

        builder.build().map_err(SessionCreationError::Config)
    }
}
