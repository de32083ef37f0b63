//! The per-user session registry.
//!
//! One `SessionManager` lives for the whole process. `acquire` hands back the
//! user's existing session or creates one; `release` and the periodic sweep
//! tear sessions down. A single coarse mutex guards the map across the whole
//! check-then-create span, so two concurrent acquires for the same user can
//! never race into two browser processes. Creation holds the lock for the
//! hundreds of milliseconds a Chrome spawn takes; with a per-human traffic
//! pattern that serialization is the point, not a bottleneck.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};

use crate::browser::SessionCreationError;
use crate::config::Verbosity;
use crate::logging::AutomationLogger;

/// Builds sessions on cache miss. The seam that lets registry behaviour be
/// exercised without a browser.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: ManagedSession;

    async fn create(&self, user_id: &str) -> Result<Self::Session, SessionCreationError>;
}

/// Anything the registry can own and tear down.
#[async_trait]
pub trait ManagedSession: Send + Sync + 'static {
    /// Must be idempotent; the registry may call it from `release` and from
    /// the sweeper.
    async fn shutdown(&self);
}

struct Entry<S> {
    session: Arc<S>,
    last_active: Instant,
}

/// Mutex-guarded user-to-session registry.
pub struct SessionManager<F: SessionFactory> {
    factory: F,
    entries: Mutex<HashMap<String, Entry<F::Session>>>,
    logger: Arc<AutomationLogger>,
}

impl<F: SessionFactory> SessionManager<F> {
    pub fn new(factory: F) -> Self {
        Self::with_logger(factory, Arc::new(AutomationLogger::new(Verbosity::Medium)))
    }

    pub fn with_logger(factory: F, logger: Arc<AutomationLogger>) -> Self {
        Self {
            factory,
            entries: Mutex::new(HashMap::new()),
            logger,
        }
    }

    /// Return the user's session, creating it on first use. The map lock is
    /// held across the whole lookup-or-create, so at most one session ever
    /// exists per user. On creation failure the map is left unchanged.
    pub async fn acquire(&self, user_id: &str) -> Result<Arc<F::Session>, SessionCreationError> {
        if user_id.trim().is_empty() {
            return Err(SessionCreationError::InvalidUserId);
        }

        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(user_id) {
            entry.last_active = Instant::now();
            self.logger.debug(
                "reusing existing session",
                Some("manager"),
                Some(serde_json::json!({ "user_id": user_id })),
            );
            return Ok(Arc::clone(&entry.session));
        }

        let session = Arc::new(self.factory.create(user_id).await?);
        entries.insert(
            user_id.to_string(),
            Entry {
                session: Arc::clone(&session),
                last_active: Instant::now(),
            },
        );
        self.logger.info(
            "session created",
            Some("manager"),
            Some(serde_json::json!({ "user_id": user_id, "active": entries.len() })),
        );
        Ok(session)
    }

    /// Shut down and remove the user's session. Releasing an absent user id
    /// is a no-op.
    pub async fn release(&self, user_id: &str) {
        let removed = {
            let mut entries = self.entries.lock().await;
            entries.remove(user_id)
        };
        if let Some(entry) = removed {
            entry.session.shutdown().await;
            self.logger.info(
                "session released",
                Some("manager"),
                Some(serde_json::json!({ "user_id": user_id })),
            );
        }
    }

    /// Shut down and remove every session idle longer than `max_idle`.
    /// Returns the number of sessions evicted.
    pub async fn sweep(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, Arc<F::Session>)> = {
            let mut entries = self.entries.lock().await;
            let stale: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_active) > max_idle)
                .map(|(user_id, _)| user_id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|user_id| {
                    entries
                        .remove(&user_id)
                        .map(|entry| (user_id, entry.session))
                })
                .collect()
        };

        let count = expired.len();
        for (user_id, session) in expired {
            session.shutdown().await;
            self.logger.info(
                "idle session evicted",
                Some("sweep"),
                Some(serde_json::json!({ "user_id": user_id })),
            );
        }
        count
    }

    /// Number of live sessions.
    pub async fn active_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Run [`sweep`](Self::sweep) on a timer until the handle is aborted or
    /// the manager is dropped. The task holds only a weak reference, so it
    /// never keeps the manager alive on its own.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, max_idle: Duration) -> JoinHandle<()> {
        let manager = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh manager
            // is not swept at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let evicted = manager.sweep(max_idle).await;
                if evicted > 0 {
                    manager.logger.debug(
                        format!("sweeper evicted {evicted} idle sessions"),
                        Some("sweep"),
                        None,
                    );
                }
            }
        })
    }

    /// Shut everything down, e.g. on process exit.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<F::Session>> = {
            let mut entries = self.entries.lock().await;
            entries.drain().map(|(_, entry)| entry.session).collect()
        };
        for session in drained {
            session.shutdown().await;
        }
    }

}
