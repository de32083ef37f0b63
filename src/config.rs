//! Strongly-typed configuration for the automation core.
//!
//! Configuration values can be constructed from defaults, loaded from
//! environment variables (with optional `.env` support), or merged with
//! explicit overrides for ergonomic programmatic updates. Only knobs the
//! session core actually consumes live here; HTTP-layer and database
//! settings belong to their own services.

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Home page of the automated site. The account menu and login form are
/// reachable from here.
pub const DEFAULT_BASE_URL: &str = "https://www.wg-gesucht.de";

/// Verbosity level for automation logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Verbosity {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

/// Configuration for the session manager and the page sessions it creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Run Chrome without a visible window. Headful mode exists for local
    /// debugging only; containers have no display.
    pub headless: bool,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    /// Explicit Chrome/Chromium binary; `None` lets chromiumoxide detect one.
    #[serde(alias = "chromeExecutable")]
    pub chrome_executable: Option<PathBuf>,
    #[serde(alias = "windowWidth")]
    pub window_width: u32,
    #[serde(alias = "windowHeight")]
    pub window_height: u32,
    /// First wait stage: the element must become visible within this window.
    #[serde(alias = "shortWaitMs")]
    pub short_wait_ms: u64,
    /// Fallback wait stage: mere DOM presence within this window.
    #[serde(alias = "longWaitMs")]
    pub long_wait_ms: u64,
    /// Settle delay applied before click and type interactions.
    #[serde(alias = "settleDelayMs")]
    pub settle_delay_ms: u64,
    /// Sessions idle longer than this are evicted by the sweeper.
    #[serde(alias = "maxIdleSecs")]
    pub max_idle_secs: u64,
    #[serde(alias = "sweepIntervalSecs")]
    pub sweep_interval_secs: u64,
    /// Directory for post-login audit screenshots; `None` disables capture.
    #[serde(alias = "screenshotDir")]
    pub screenshot_dir: Option<PathBuf>,
    pub verbose: Verbosity,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        AutomationConfig {
            headless: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            chrome_executable: None,
            window_width: 1920,
            window_height: 1080,
            short_wait_ms: 10_000,
            long_wait_ms: 30_000,
            settle_delay_ms: 500,
            max_idle_secs: 3_600,
            sweep_interval_secs: 60,
            screenshot_dir: None,
            verbose: Verbosity::default(),
        }
    }
}

impl AutomationConfig {
    /// Construct a configuration from environment variables, after loading a
    /// `.env` file when one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = AutomationConfig::default();

        if let Some(value) = env_var("WG_AUTOMAT_HEADLESS") {
            config.headless = parse_bool("WG_AUTOMAT_HEADLESS", &value)?;
        }
        if let Some(value) = env_var("WG_AUTOMAT_BASE_URL") {
            config.base_url = value;
        }
        if let Some(value) = env_var("WG_AUTOMAT_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }
        if let Some(value) = env_var("WG_AUTOMAT_WINDOW_WIDTH") {
            config.window_width = parse_u32("WG_AUTOMAT_WINDOW_WIDTH", &value)?;
        }
        if let Some(value) = env_var("WG_AUTOMAT_WINDOW_HEIGHT") {
            config.window_height = parse_u32("WG_AUTOMAT_WINDOW_HEIGHT", &value)?;
        }
        if let Some(value) = env_var("WG_AUTOMAT_SHORT_WAIT_MS") {
            config.short_wait_ms = parse_u64("WG_AUTOMAT_SHORT_WAIT_MS", &value)?;
        }
        if let Some(value) = env_var("WG_AUTOMAT_LONG_WAIT_MS") {
            config.long_wait_ms = parse_u64("WG_AUTOMAT_LONG_WAIT_MS", &value)?;
        }
        if let Some(value) = env_var("WG_AUTOMAT_SETTLE_DELAY_MS") {
            config.settle_delay_ms = parse_u64("WG_AUTOMAT_SETTLE_DELAY_MS", &value)?;
        }
        if let Some(value) = env_var("WG_AUTOMAT_MAX_IDLE_SECS") {
            config.max_idle_secs = parse_u64("WG_AUTOMAT_MAX_IDLE_SECS", &value)?;
        }
        if let Some(value) = env_var("WG_AUTOMAT_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = parse_u64("WG_AUTOMAT_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = env_var("WG_AUTOMAT_SCREENSHOT_DIR") {
            config.screenshot_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = env_var("WG_AUTOMAT_VERBOSE") {
            let parsed = parse_u8("WG_AUTOMAT_VERBOSE", &value)?;
            config.verbose =
                Verbosity::from_u8(parsed).ok_or(ConfigError::InvalidVerbosity { value: parsed })?;
        }

        Ok(config)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: AutomationConfigOverrides) -> AutomationConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.base_url {
            next.base_url = value;
        }
        if let Some(value) = overrides.chrome_executable {
            next.chrome_executable = value;
        }
        if let Some(value) = overrides.short_wait_ms {
            next.short_wait_ms = value;
        }
        if let Some(value) = overrides.long_wait_ms {
            next.long_wait_ms = value;
        }
        if let Some(value) = overrides.settle_delay_ms {
            next.settle_delay_ms = value;
        }
        if let Some(value) = overrides.max_idle_secs {
            next.max_idle_secs = value;
        }
        if let Some(value) = overrides.sweep_interval_secs {
            next.sweep_interval_secs = value;
        }
        if let Some(value) = overrides.screenshot_dir {
            next.screenshot_dir = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }

        next
    }

    pub fn short_wait(&self) -> Duration {
        Duration::from_millis(self.short_wait_ms)
    }

    pub fn long_wait(&self) -> Duration {
        Duration::from_millis(self.long_wait_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Field-level overrides consumed by [`AutomationConfig::with_overrides`].
///
/// Double-`Option` fields distinguish "leave unchanged" from "clear".
#[derive(Debug, Default, Clone)]
pub struct AutomationConfigOverrides {
    pub headless: Option<bool>,
    pub base_url: Option<String>,
    pub chrome_executable: Option<Option<PathBuf>>,
    pub short_wait_ms: Option<u64>,
    pub long_wait_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub max_idle_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub screenshot_dir: Option<Option<PathBuf>>,
    pub verbose: Option<Verbosity>,
}

/// Errors surfaced while constructing an [`AutomationConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("verbosity must be 0, 1 or 2, got {value}")]
    InvalidVerbosity { value: u8 },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}
