//! Account gateway: the glue between the registry, the credential store and
//! a session's login primitives.
//!
//! `authenticate` is the credential-verification path: it borrows a session,
//! attempts the login and always releases the session afterwards, success or
//! not. Verification sessions have no scraping work to do, so keeping them
//! alive only burns memory. `ensure_logged_in` is the pre-scrape path: it
//! keeps the session and restores authentication lazily when the site has
//! silently dropped it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::browser::SessionCreationError;
use crate::credentials::{AccountCredentials, CredentialError, CredentialStore};
use crate::manager::{ManagedSession, SessionFactory, SessionManager};
use crate::session::{PageSession, SessionError};

/// Login-capable session. Split from [`ManagedSession`] so gateway logic can
/// be exercised with scripted sessions.
#[async_trait]
pub trait AuthSession: ManagedSession {
    async fn login(&self, email: &str, password: &str) -> Result<bool, SessionError>;
    async fn is_authenticated(&self) -> Result<bool, SessionError>;
}

#[async_trait]
impl AuthSession for PageSession {
    async fn login(&self, email: &str, password: &str) -> Result<bool, SessionError> {
        PageSession::login(self, email, password).await
    }

    async fn is_authenticated(&self) -> Result<bool, SessionError> {
        PageSession::is_authenticated(self).await
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Creation(#[from] SessionCreationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

pub struct AccountGateway<F, S>
where
    F: SessionFactory,
    F::Session: AuthSession,
    S: CredentialStore,
{
    manager: Arc<SessionManager<F>>,
    store: S,
}

impl<F, S> AccountGateway<F, S>
where
    F: SessionFactory,
    F::Session: AuthSession,
    S: CredentialStore,
{
    pub fn new(manager: Arc<SessionManager<F>>, store: S) -> Self {
        Self { manager, store }
    }

    pub fn manager(&self) -> &Arc<SessionManager<F>> {
        &self.manager
    }

    /// Verify credentials against the site. The session is released whatever
    /// happens, including automation errors.
    pub async fn authenticate(
        &self,
        user_id: &str,
        credentials: &AccountCredentials,
    ) -> Result<bool, GatewayError> {
        let session = self.manager.acquire(user_id).await?;
        let outcome = session
            .login(&credentials.email, &credentials.password)
            .await;
        self.manager.release(user_id).await;
        Ok(outcome?)
    }

    /// Make sure the user's session is authenticated, logging in from the
    /// stored credentials when the remote session has expired. The session
    /// stays in the registry for the caller's subsequent work.
    pub async fn ensure_logged_in(&self, user_id: &str) -> Result<bool, GatewayError> {
        let session = self.manager.acquire(user_id).await?;
        if session.is_authenticated().await? {
            return Ok(true);
        }
        let credentials = self.store.credentials_for(user_id).await?;
        Ok(session
            .login(&credentials.email, &credentials.password)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::InMemoryCredentialStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Step {
        LoginOk,
        LoginRejected,
        LoginError,
        Authed,
        NotAuthed,
    }

    struct ScriptedSession {
        script: Mutex<Vec<Step>>,
        login_calls: AtomicUsize,
        closed: AtomicBool,
    }

    impl ScriptedSession {
        fn next_step(&self) -> Step {
            self.script.lock().unwrap().remove(0)
        }
    }

    #[async_trait]
    impl ManagedSession for ScriptedSession {
        async fn shutdown(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AuthSession for ScriptedSession {
        async fn login(&self, _email: &str, _password: &str) -> Result<bool, SessionError> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            match self.next_step() {
                Step::LoginOk => Ok(true),
                Step::LoginRejected => Ok(false),
                Step::LoginError => Err(SessionError::Cdp("socket closed".to_string())),
                _ => panic!("script expected a login step"),
            }
        }

        async fn is_authenticated(&self) -> Result<bool, SessionError> {
            match self.next_step() {
                Step::Authed => Ok(true),
                Step::NotAuthed => Ok(false),
                _ => panic!("script expected an auth-check step"),
            }
        }
    }

    struct ScriptedFactory {
        script: Mutex<Vec<Step>>,
    }

    impl ScriptedFactory {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl SessionFactory for ScriptedFactory {
        type Session = ScriptedSession;

        async fn create(&self, _user_id: &str) -> Result<ScriptedSession, SessionCreationError> {
            Ok(ScriptedSession {
                script: Mutex::new(self.script.lock().unwrap().clone()),
                login_calls: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            })
        }
    }

    fn gateway(
        script: Vec<Step>,
    ) -> AccountGateway<ScriptedFactory, InMemoryCredentialStore> {
        let manager = Arc::new(SessionManager::new(ScriptedFactory::new(script)));
        let store = InMemoryCredentialStore::new();
        store.insert("u-1", AccountCredentials::new("anna@example.org", "s3cret"));
        AccountGateway::new(manager, store)
    }

    #[tokio::test]
    async fn authenticate_releases_after_success() {
        let gateway = gateway(vec![Step::LoginOk]);
        let creds = AccountCredentials::new("anna@example.org", "s3cret");
        assert!(gateway.authenticate("u-1", &creds).await.unwrap());
        assert_eq!(gateway.manager().active_count().await, 0);
    }

    #[tokio::test]
    async fn authenticate_releases_after_rejection() {
        let gateway = gateway(vec![Step::LoginRejected]);
        let creds = AccountCredentials::new("anna@example.org", "wrong");
        assert!(!gateway.authenticate("u-1", &creds).await.unwrap());
        assert_eq!(gateway.manager().active_count().await, 0);
    }

    #[tokio::test]
    async fn authenticate_releases_even_on_session_errors() {
        let gateway = gateway(vec![Step::LoginError]);
        let creds = AccountCredentials::new("anna@example.org", "s3cret");
        let err = gateway.authenticate("u-1", &creds).await.unwrap_err();
        assert!(matches!(err, GatewayError::Session(SessionError::Cdp(_))));
        assert_eq!(gateway.manager().active_count().await, 0);
    }

    #[tokio::test]
    async fn ensure_logged_in_skips_login_when_still_authenticated() {
        let gateway = gateway(vec![Step::Authed]);
        assert!(gateway.ensure_logged_in("u-1").await.unwrap());

        let session = gateway.manager().acquire("u-1").await.unwrap();
        assert_eq!(session.login_calls.load(Ordering::SeqCst), 0);
        // The session stays registered for follow-up scraping.
        assert_eq!(gateway.manager().active_count().await, 1);
    }

    #[tokio::test]
    async fn ensure_logged_in_relogs_after_remote_expiry() {
        let gateway = gateway(vec![Step::NotAuthed, Step::LoginOk]);
        assert!(gateway.ensure_logged_in("u-1").await.unwrap());

        let session = gateway.manager().acquire("u-1").await.unwrap();
        assert_eq!(session.login_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ensure_logged_in_fails_without_stored_credentials() {
        let gateway = gateway(vec![Step::NotAuthed]);
        let err = gateway.ensure_logged_in("stranger").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Credentials(CredentialError::Missing { .. })
        ));
    }
}
