//! Session manager
//!
//! Single authority for "is the user logged in, with what identity, and what
//! token do outbound requests use". Owns the persisted token pair, performs
//! proactive and reactive renewal, and broadcasts lifecycle events through
//! the [`EventBus`]. Consumers observe state only through emitted events and
//! the [`SessionManager::current`] snapshot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::api::{ApiError, AuthBackend};
use crate::events::{AuthEvent, EventBus, ExpiryReason};
use crate::models::{Session, User, UserProfile};
use crate::settings::SessionSettings;
use crate::storage::{SessionStore, StoreError};
use crate::token;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active session")]
    NotAuthenticated,
    #[error("session expired: {0}")]
    Expired(ExpiryReason),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Client-side session authority.
///
/// All renewal paths funnel through a single async gate so that at most one
/// refresh request is in flight per session; concurrent triggers share its
/// outcome instead of issuing redundant calls.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    auth: Arc<dyn AuthBackend>,
    events: EventBus,
    settings: SessionSettings,
    state: Mutex<Option<Session>>,
    refresh_gate: tokio::sync::Mutex<()>,
    last_activity: Mutex<tokio::time::Instant>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        auth: Arc<dyn AuthBackend>,
        events: EventBus,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            auth,
            events,
            settings,
            state: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            last_activity: Mutex::new(tokio::time::Instant::now()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Restore a persisted session on startup.
    ///
    /// A stored access token whose embedded expiry is already in the past is
    /// never reused: storage is cleared and the manager stays
    /// unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read or cleared.
    pub fn initialize(&self) -> Result<Option<Session>, SessionError> {
        let (access_token, user) = match (self.store.access_token()?, self.store.user()?) {
            (Some(access_token), Some(user)) => (access_token, user),
            (None, None) => {
                log::debug!("no persisted session to restore");
                return Ok(None);
            }
            _ => {
                // A token without a user record (or vice versa) is never reused.
                log::warn!("incomplete persisted session, clearing storage");
                self.store.clear()?;
                return Ok(None);
            }
        };

        if token::is_expired(&access_token, Duration::zero()) {
            log::info!("persisted access token already expired, clearing storage");
            self.store.clear()?;
            return Ok(None);
        }

        let session = Session {
            user,
            access_token,
            refresh_token: self.store.refresh_token()?,
        };
        *self.state_guard() = Some(session.clone());
        self.record_activity();
        log::info!("restored session for user {}", session.user.username);
        Ok(Some(session))
    }

    /// Establish a session from a token pair and user profile.
    ///
    /// Missing optional profile fields are defaulted (role to `user`,
    /// timestamps to now) before persisting.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted.
    pub fn login(
        &self,
        access_token: &str,
        refresh_token: &str,
        profile: UserProfile,
    ) -> Result<Session, SessionError> {
        let user = User::from_profile(profile);

        self.store.set_tokens(access_token, refresh_token)?;
        self.store.set_user(&user)?;

        let session = Session {
            user,
            access_token: access_token.to_string(),
            refresh_token: Some(refresh_token.to_string()),
        };
        *self.state_guard() = Some(session.clone());
        self.record_activity();
        self.events.emit(AuthEvent::SessionEstablished);
        log::info!("session established for user {}", session.user.username);
        Ok(session)
    }

    /// Exchange a GitHub OAuth callback code and establish the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the code exchange fails or the session cannot be
    /// persisted.
    pub async fn handle_oauth_callback(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Session, SessionError> {
        let response = self.auth.exchange_github_code(code, redirect_uri).await?;
        let (access_token, refresh_token, profile) = response.into_parts();
        self.login(&access_token, &refresh_token, profile)
    }

    /// Tear down the session.
    ///
    /// Local state is cleared synchronously so the UI reflects the logged-out
    /// state immediately; server-side revocation of the refresh token runs
    /// best-effort in the background and its failure is swallowed. Background
    /// monitors are stopped; a later [`SessionManager::login`] may restart
    /// them via [`SessionManager::start_monitors`].
    pub fn logout(&self) {
        self.shutdown();
        let refresh_token = self
            .state_guard()
            .take()
            .and_then(|session| session.refresh_token)
            .or_else(|| self.store.refresh_token().ok().flatten());

        if let Err(e) = self.store.clear() {
            log::warn!("failed to clear session storage on logout: {e}");
        }
        self.events.emit(AuthEvent::Logout);
        log::info!("logged out");

        if let Some(refresh_token) = refresh_token {
            let auth = Arc::clone(&self.auth);
            tokio::spawn(async move {
                if let Err(e) = auth.revoke_refresh_token(&refresh_token).await {
                    log::debug!("best-effort logout notification failed: {e}");
                }
            });
        }
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Cloned snapshot of the active session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.state_guard().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state_guard().is_some()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.state_guard()
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    // =========================================================================
    // Renewal
    // =========================================================================

    /// Reactive renewal entry point for the request layer.
    ///
    /// Called when an authenticated request came back 401 with
    /// `failed_token`. Concurrent callers collapse into one in-flight
    /// refresh: whoever acquires the gate first refreshes, and waiters that
    /// arrive while it is outstanding observe the replaced token afterwards
    /// and skip the duplicate call. A failed refresh tears the session down,
    /// so late waiters fail without issuing further network calls.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session to renew or the refresh
    /// exchange fails (the session is expired in that case).
    pub async fn handle_unauthorized(&self, failed_token: &str) -> Result<String, SessionError> {
        let _gate = self.refresh_gate.lock().await;

        match self.access_token() {
            None => Err(SessionError::NotAuthenticated),
            Some(current) if current != failed_token => Ok(current),
            Some(_) => self.refresh_locked().await,
        }
    }

    /// Proactive renewal check, driven by the background monitor.
    ///
    /// Refreshes when the token has entered the renewal window but has not
    /// yet fully expired. A token found fully expired here is terminal.
    pub(crate) async fn renew_if_due(&self) {
        let Some(access_token) = self.access_token() else {
            return;
        };

        let remaining = token::time_until_expiry(&access_token);
        if remaining <= Duration::zero() {
            self.expire(ExpiryReason::TokenExpired);
            return;
        }

        let buffer = Duration::minutes(
            i64::try_from(self.settings.refresh_buffer_minutes).unwrap_or(i64::MAX),
        );
        if remaining > buffer {
            return;
        }

        log::debug!(
            "access token inside renewal window ({}s left), refreshing",
            remaining.num_seconds()
        );
        let _gate = self.refresh_gate.lock().await;
        // A reactive refresh may have won the race while we waited
        if self.access_token().as_deref() != Some(access_token.as_str()) {
            return;
        }
        // A single failed renewal is terminal; refresh_locked already
        // emitted the expiry signal
        let _ = self.refresh_locked().await;
    }

    /// Perform one refresh exchange. Caller must hold the refresh gate.
    async fn refresh_locked(&self) -> Result<String, SessionError> {
        let refresh_token = self
            .state_guard()
            .as_ref()
            .and_then(|session| session.refresh_token.clone());

        let Some(refresh_token) = refresh_token else {
            self.expire(ExpiryReason::NoRefreshToken);
            return Err(SessionError::Expired(ExpiryReason::NoRefreshToken));
        };

        match self.auth.refresh_tokens(&refresh_token).await {
            Ok(pair) => {
                self.store.set_tokens(&pair.token, &pair.refresh_token)?;
                if let Some(session) = self.state_guard().as_mut() {
                    session.access_token = pair.token.clone();
                    session.refresh_token = Some(pair.refresh_token);
                }
                self.events.emit(AuthEvent::TokenRefreshed);
                log::debug!("access token refreshed");
                Ok(pair.token)
            }
            Err(e) => {
                log::warn!("token refresh failed: {e}");
                self.expire(ExpiryReason::RefreshFailed);
                Err(SessionError::Expired(ExpiryReason::RefreshFailed))
            }
        }
    }

    // =========================================================================
    // Expiry and validation
    // =========================================================================

    /// Normalize any renewal or validation failure into a single expiry
    /// signal. Idempotent: a second call while the session is already torn
    /// down is a no-op.
    pub(crate) fn expire(&self, reason: ExpiryReason) {
        if self.state_guard().take().is_none() {
            return;
        }
        if let Err(e) = self.store.clear() {
            log::warn!("failed to clear session storage on expiry: {e}");
        }
        log::info!("session expired: {reason}");
        self.events.emit(AuthEvent::SessionExpired(reason));
    }

    /// Re-confirm the session is still recognized by the server.
    ///
    /// Any failure of the identity probe expires the session.
    pub(crate) async fn validate_with_server(&self) {
        let Some(session) = self.current() else {
            return;
        };

        if let Err(e) = self
            .auth
            .fetch_user(&session.access_token, &session.user.id)
            .await
        {
            log::warn!("periodic session validation failed: {e}");
            self.expire(ExpiryReason::ValidationFailed);
        }
    }

    // =========================================================================
    // Activity tracking
    // =========================================================================

    /// Record user interaction; resets the inactivity window.
    pub fn record_activity(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = tokio::time::Instant::now();
    }

    pub(crate) fn idle_for(&self) -> std::time::Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub(crate) fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    // =========================================================================
    // Background tasks
    // =========================================================================

    /// Start the renewal, inactivity and validation monitors.
    ///
    /// Monitors hold only a weak reference back to the manager; dropping the
    /// last strong reference or calling [`SessionManager::shutdown`] stops
    /// them, so no signal can be emitted after teardown.
    pub fn start_monitors(self: &Arc<Self>) {
        let handles = super::monitor::spawn_monitors(self);
        self.tasks_guard().extend(handles);
    }

    /// Stop all background monitors. Called automatically on drop.
    pub fn shutdown(&self) {
        for handle in self.tasks_guard().drain(..) {
            handle.abort();
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, Option<Session>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks_guard(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
