//! Per-user headless-browser session pool for WG-Gesucht automation.
//!
//! The crate is built around two pieces: [`session::PageSession`], a stateful
//! handle to one headless Chrome tab bound to one WG-Gesucht account, and
//! [`manager::SessionManager`], the process-wide registry that hands out at
//! most one live session per user, reuses it across requests, and reclaims it
//! after inactivity. Page-specific scraping services borrow a session from
//! the manager and drive it through the session's navigation and interaction
//! primitives; they never own the underlying browser process themselves.
//!
//! Spawning Chrome costs hundreds of milliseconds, which is the whole reason
//! the registry exists. Everything in here is single-process, in-memory
//! state: nothing survives a restart.

pub mod account;
pub mod browser;
pub mod config;
pub mod credentials;
pub mod dom_scripts;
pub mod logging;
pub mod manager;
pub mod session;

pub use account::{AccountGateway, AuthSession, GatewayError};
pub use browser::{LaunchPlan, SessionCreationError};
pub use config::{AutomationConfig, AutomationConfigOverrides, ConfigError, Verbosity};
pub use credentials::{
    AccountCredentials, CredentialError, CredentialStore, InMemoryCredentialStore,
};
pub use logging::{AutomationLogger, LogCallback, LogConfig, LogLevel, LogRecord};
pub use manager::{ManagedSession, SessionFactory, SessionManager};
pub use session::{ChromeSessionFactory, FoundElement, Locator, PageSession, SessionError};
