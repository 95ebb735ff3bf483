//! Session management with FSM-based state tracking.
//!
//! [`SessionManager`] is the single source of truth for "who is logged in".
//! It owns the credential store and the API client, tracks the lifecycle in
//! an explicit state machine, and broadcasts whole-value [`Session`]
//! snapshots over a watch channel — consumers never observe a half-updated
//! user/token pair.
//!
//! User-facing operations (`initialize`, `login`, `register`, `logout`,
//! `update_profile`) never return an error: every failure path resolves to a
//! published snapshot with the `error` field set, so the screen layer needs
//! no crash-boundary handling for auth. The internal token API
//! ([`SessionManager::get_valid_token`]) does return `Result` for the data
//! layer's benefit.

use crate::session_fsm::{
    RetryConfig, SessionMachine, SessionMachineInput, SessionState,
};
use crate::validate::{validate_login, validate_registration};
use crate::{SessionError, SessionResult};
use chrono::Utc;
use playlet_api::{ApiClient, ApiError, AuthResponse, ProfilePatch, RegisterRequest, User};
use playlet_storage::{CredentialStore, SessionMeta, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One atomic snapshot of the session.
///
/// Invariant: `user` and `token` are either both set or both absent; every
/// constructor and every published snapshot preserves this.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Cached user record; `None` when anonymous.
    pub user: Option<User>,
    /// Access token; `None` when anonymous.
    pub token: Option<String>,
    /// Lifecycle state.
    pub state: SessionState,
    /// An operation is in flight.
    pub is_loading: bool,
    /// `initialize()` has completed (successfully or not).
    pub is_initialized: bool,
    /// User-facing message from the last failed operation.
    pub error: Option<String>,
}

impl Session {
    fn uninitialized() -> Self {
        Self {
            user: None,
            token: None,
            state: SessionState::Uninitialized,
            is_loading: false,
            is_initialized: false,
            error: None,
        }
    }

    fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            ..Self::uninitialized()
        }
    }

    fn authenticated(user: User, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
            state: SessionState::Authenticated,
            is_loading: false,
            is_initialized: false,
            error: None,
        }
    }

    /// Returns true when a valid user/token pair is present.
    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// The user/token pairing invariant.
    pub fn invariant_holds(&self) -> bool {
        self.user.is_some() == self.token.is_some()
    }
}

/// Session manager: owns auth state and its server-side side effects.
///
/// Constructed by the composition root and passed by reference (no
/// process-wide global). Concurrent auth operations are serialized by a
/// single in-flight slot: `login`/`register`/`update_profile` fail fast when
/// the slot is taken, `logout` waits for it so its local-clear guarantee is
/// unconditional.
pub struct SessionManager {
    credentials: CredentialStore,
    api: ApiClient,
    /// Internal FSM for lifecycle transitions.
    fsm: Mutex<SessionMachine>,
    /// Backoff configuration for token refresh.
    retry_config: RetryConfig,
    /// Snapshot broadcast; `subscribe()` hands out receivers.
    snapshot_tx: watch::Sender<Session>,
    /// Set once `initialize()` has finished.
    initialized: AtomicBool,
    /// Single-slot guard for auth operations.
    op_guard: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(credentials: CredentialStore, api: ApiClient) -> Self {
        Self::with_retry_config(credentials, api, RetryConfig::default())
    }

    /// Create a new session manager with custom refresh retry configuration.
    pub fn with_retry_config(
        credentials: CredentialStore,
        api: ApiClient,
        retry_config: RetryConfig,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Session::uninitialized());
        Self {
            credentials,
            api,
            fsm: Mutex::new(SessionMachine::new()),
            retry_config,
            snapshot_tx,
            initialized: AtomicBool::new(false),
            op_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Current snapshot.
    pub fn current(&self) -> Session {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.snapshot_tx.subscribe()
    }

    /// Current lifecycle state as tracked by the FSM.
    pub fn state(&self) -> SessionState {
        SessionState::from(self.fsm.lock().unwrap().state())
    }

    /// Transition the FSM, logging state changes.
    fn transition(&self, input: &SessionMachineInput) -> SessionResult<SessionState> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = SessionState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Session state transition");
        }

        Ok(new_state)
    }

    /// Publish a snapshot, replacing the previous one wholesale.
    fn publish(&self, mut session: Session) {
        session.is_initialized = self.initialized.load(Ordering::SeqCst);
        debug_assert!(
            session.invariant_holds(),
            "published session must pair user and token"
        );
        let changed = *self.snapshot_tx.borrow() != session;
        if changed {
            self.snapshot_tx.send_replace(session);
        }
    }

    /// Build the snapshot returned for an operation that never started
    /// (slot taken, validation failure, wrong state). Not broadcast, so an
    /// in-flight operation's snapshots are not disturbed.
    fn rejected(&self, err: &SessionError) -> Session {
        warn!(error = %err, "Session operation rejected");
        let mut session = self.current();
        session.error = Some(err.user_message());
        session
    }

    // ==========================================
    // Initialize
    // ==========================================

    /// Restore the session from the persistent store.
    ///
    /// Never fails from the caller's perspective: storage errors, corrupt
    /// records, and failed refreshes all degrade to an anonymous session.
    /// Always ends with `is_initialized == true`.
    pub async fn initialize(&self) -> Session {
        if let Err(e) = self.transition(&SessionMachineInput::InitializeRequested) {
            warn!(error = %e, "initialize() called more than once, ignoring");
            return self.current();
        }

        let restored = self.restore_session().await;
        self.initialized.store(true, Ordering::SeqCst);

        match restored {
            Some((user, token)) => {
                info!(user_id = %user.id, "Session restored");
                self.publish(Session::authenticated(user, token));
            }
            None => self.publish(Session::anonymous()),
        }
        self.current()
    }

    /// Read and validate the stored session, refreshing an expired token.
    /// Returns `None` for every anonymous outcome; FSM transitions happen
    /// inside.
    async fn restore_session(&self) -> Option<(User, String)> {
        let has_session = match self.credentials.has_session() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Could not read stored session, starting anonymous");
                let _ = self.transition(&SessionMachineInput::RestoreFailed);
                return None;
            }
        };

        if !has_session {
            info!("No stored session found");
            let _ = self.transition(&SessionMachineInput::NoStoredSession);
            return None;
        }

        let stored = self.read_stored_session();
        let (token, refresh_token, user, expired) = match stored {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Stored session unreadable, clearing");
                let _ = self.credentials.clear_session();
                let _ = self.transition(&SessionMachineInput::RestoreFailed);
                return None;
            }
        };

        if !expired {
            let _ = self.transition(&SessionMachineInput::SessionRestored);
            return Some((user, token));
        }

        let Some(refresh_token) = refresh_token else {
            warn!("Stored session expired with no refresh token, clearing");
            let _ = self.credentials.clear_session();
            let _ = self.transition(&SessionMachineInput::RestoreFailed);
            return None;
        };

        info!(user_id = %user.id, "Stored session expired, refreshing");
        let _ = self.transition(&SessionMachineInput::StoredSessionExpired);
        match self.refresh_with_backoff(&refresh_token).await {
            Ok(restored) => Some(restored),
            Err(e) => {
                warn!(error = %e, "Startup refresh failed, starting anonymous");
                None
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn read_stored_session(&self) -> SessionResult<(String, Option<String>, User, bool)> {
        let token = self
            .credentials
            .get_access_token()?
            .ok_or(SessionError::NotAuthenticated)?;
        let user_json = self
            .credentials
            .get_user_record()?
            .ok_or(SessionError::NotAuthenticated)?;
        let user: User = serde_json::from_str(&user_json)
            .map_err(|e| SessionError::Storage(StorageError::Encoding(e.to_string())))?;
        let refresh_token = self.credentials.get_refresh_token()?;
        let expired = self.credentials.is_session_expired()?;
        Ok((token, refresh_token, user, expired))
    }

    // ==========================================
    // Login / register
    // ==========================================

    /// Authenticate with username and password.
    ///
    /// Credentials are persisted before the in-memory snapshot is swapped,
    /// so a crash between the two cannot leave storage claiming a session
    /// that memory never saw (or vice versa). On failure the prior session
    /// is untouched and the snapshot carries a user-facing `error`.
    pub async fn login(&self, username: &str, password: &str) -> Session {
        let Ok(_permit) = self.op_guard.try_lock() else {
            return self.rejected(&SessionError::OperationInProgress);
        };

        if let Some(first) = validate_login(username, password).into_iter().next() {
            return self.rejected(&SessionError::Validation(first));
        }

        if let Err(e) = self.transition(&SessionMachineInput::AuthRequested) {
            return self.rejected(&e);
        }

        self.publish(self.loading_snapshot());

        info!(username = %username, "Logging in");
        match self.api.login(username, password).await {
            Ok(auth) => self.complete_auth(auth),
            Err(e) => self.fail_auth(auth_error(e)),
        }
    }

    /// Create an account. Identical contract to [`login`](Self::login),
    /// different endpoint.
    pub async fn register(&self, req: &RegisterRequest) -> Session {
        let Ok(_permit) = self.op_guard.try_lock() else {
            return self.rejected(&SessionError::OperationInProgress);
        };

        if let Some(first) = validate_registration(req).into_iter().next() {
            return self.rejected(&SessionError::Validation(first));
        }

        if let Err(e) = self.transition(&SessionMachineInput::AuthRequested) {
            return self.rejected(&e);
        }

        self.publish(self.loading_snapshot());

        info!(username = %req.username, "Registering");
        match self.api.register(req).await {
            Ok(auth) => self.complete_auth(auth),
            Err(e) => self.fail_auth(auth_error(e)),
        }
    }

    fn loading_snapshot(&self) -> Session {
        let cur = self.current();
        Session {
            user: cur.user,
            token: cur.token,
            state: self.state(),
            is_loading: true,
            is_initialized: cur.is_initialized,
            error: None,
        }
    }

    /// Persist the auth response, then swap the in-memory snapshot.
    fn complete_auth(&self, auth: AuthResponse) -> Session {
        let user_json = match serde_json::to_string(&auth.user) {
            Ok(json) => json,
            Err(e) => {
                return self.fail_auth(SessionError::Storage(StorageError::Encoding(
                    e.to_string(),
                )))
            }
        };

        let meta = SessionMeta {
            user_id: auth.user.id.clone(),
            expires_at: (Utc::now() + chrono::Duration::seconds(auth.expires_in)).to_rfc3339(),
        };

        if let Err(e) =
            self.credentials
                .set_session(&auth.access_token, &auth.refresh_token, &user_json, &meta)
        {
            warn!(error = %e, "Failed to persist session");
            return self.fail_auth(SessionError::Storage(e));
        }

        let _ = self.transition(&SessionMachineInput::AuthSucceeded);
        info!(user_id = %auth.user.id, "Signed in");
        self.publish(Session::authenticated(auth.user, auth.access_token));
        self.current()
    }

    fn fail_auth(&self, err: SessionError) -> Session {
        warn!(error = %err, "Authentication failed");
        let _ = self.transition(&SessionMachineInput::AuthFailed);
        let cur = self.current();
        self.publish(Session {
            user: cur.user,
            token: cur.token,
            state: self.state(),
            is_loading: false,
            is_initialized: cur.is_initialized,
            error: Some(err.user_message()),
        });
        self.current()
    }

    // ==========================================
    // Logout
    // ==========================================

    /// End the session.
    ///
    /// Attempts server-side invalidation when a token is present, but clears
    /// local state regardless of the outcome — logout is unconditionally
    /// effective locally and idempotent from Anonymous.
    pub async fn logout(&self) -> Session {
        let _permit = self.op_guard.lock().await;

        let cur = self.current();
        let was_active = self
            .transition(&SessionMachineInput::LogoutRequested)
            .is_ok();

        if was_active {
            self.publish(Session {
                user: cur.user.clone(),
                token: cur.token.clone(),
                state: self.state(),
                is_loading: true,
                is_initialized: cur.is_initialized,
                error: None,
            });

            if let Some(token) = &cur.token {
                if let Err(e) = self.api.logout(token).await {
                    warn!(error = %e, "Server-side session invalidation failed, clearing locally anyway");
                }
            }
        }

        if let Err(e) = self.credentials.clear_session() {
            warn!(error = %e, "Failed to clear stored credentials");
        }

        let _ = self.transition(&SessionMachineInput::LogoutComplete);
        info!("Signed out");

        let mut anonymous = Session::anonymous();
        anonymous.state = self.state();
        self.publish(anonymous);
        self.current()
    }

    // ==========================================
    // Profile
    // ==========================================

    /// Update the user's profile.
    ///
    /// No optimistic update: the server's canonical record is persisted and
    /// swapped in only after success. On failure the in-memory user is
    /// untouched and `error` is set.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Session {
        let Ok(_permit) = self.op_guard.try_lock() else {
            return self.rejected(&SessionError::OperationInProgress);
        };

        let cur = self.current();
        let Some(token) = cur.token.clone() else {
            return self.rejected(&SessionError::NotAuthenticated);
        };

        self.publish(Session {
            user: cur.user.clone(),
            token: cur.token.clone(),
            state: cur.state,
            is_loading: true,
            is_initialized: cur.is_initialized,
            error: None,
        });

        match self.api.update_profile(&token, patch).await {
            Ok(user) => {
                if let Err(e) = serde_json::to_string(&user)
                    .map_err(|e| StorageError::Encoding(e.to_string()))
                    .and_then(|json| self.credentials.set_user_record(&json))
                {
                    warn!(error = %e, "Failed to persist updated profile");
                    return self.settle_profile(cur, Some(
                        SessionError::Storage(e).user_message(),
                    ));
                }

                info!(user_id = %user.id, "Profile updated");
                self.publish(Session {
                    user: Some(user),
                    token: cur.token,
                    state: cur.state,
                    is_loading: false,
                    is_initialized: cur.is_initialized,
                    error: None,
                });
                self.current()
            }
            Err(e) => {
                warn!(error = %e, "Profile update failed");
                let message = SessionError::from(e).user_message();
                self.settle_profile(cur, Some(message))
            }
        }
    }

    /// Refetch the user record from the server (best-effort consistency).
    ///
    /// On success the canonical record is persisted and swapped in; on
    /// failure the published snapshot is left untouched and only the
    /// returned copy carries the error.
    pub async fn reload_profile(&self) -> Session {
        let Ok(_permit) = self.op_guard.try_lock() else {
            return self.rejected(&SessionError::OperationInProgress);
        };

        let cur = self.current();
        let Some(token) = cur.token.clone() else {
            return self.rejected(&SessionError::NotAuthenticated);
        };

        match self.api.get_profile(&token).await {
            Ok(user) => {
                if let Err(e) = serde_json::to_string(&user)
                    .map_err(|e| StorageError::Encoding(e.to_string()))
                    .and_then(|json| self.credentials.set_user_record(&json))
                {
                    warn!(error = %e, "Failed to persist reloaded profile");
                }
                self.publish(Session {
                    user: Some(user),
                    token: cur.token,
                    state: cur.state,
                    is_loading: false,
                    is_initialized: cur.is_initialized,
                    error: None,
                });
                self.current()
            }
            Err(e) => {
                warn!(error = %e, "Profile reload failed");
                let mut session = self.current();
                session.error = Some(SessionError::from(e).user_message());
                session
            }
        }
    }

    fn settle_profile(&self, prior: Session, error: Option<String>) -> Session {
        self.publish(Session {
            user: prior.user,
            token: prior.token,
            state: prior.state,
            is_loading: false,
            is_initialized: prior.is_initialized,
            error,
        });
        self.current()
    }

    // ==========================================
    // Tokens
    // ==========================================

    /// Get a valid access token for the data layer, refreshing if expired.
    pub async fn get_valid_token(&self) -> SessionResult<String> {
        if !self.credentials.has_session()? {
            return Err(SessionError::NotAuthenticated);
        }

        let token = self
            .credentials
            .get_access_token()?
            .ok_or(SessionError::NotAuthenticated)?;

        if !self.credentials.is_session_expired()? {
            return Ok(token);
        }

        info!("Access token expired, refreshing");
        let _permit = self.op_guard.lock().await;

        // Another operation may have refreshed while we waited for the slot
        if !self.credentials.is_session_expired()? {
            return self
                .credentials
                .get_access_token()?
                .ok_or(SessionError::NotAuthenticated);
        }

        let refresh_token = self
            .credentials
            .get_refresh_token()?
            .ok_or(SessionError::NotAuthenticated)?;

        self.transition(&SessionMachineInput::TokenExpired)?;
        match self.refresh_with_backoff(&refresh_token).await {
            Ok((user, token)) => {
                self.publish(Session::authenticated(user, token.clone()));
                Ok(token)
            }
            Err(e) => {
                let mut anonymous = Session::anonymous();
                anonymous.state = self.state();
                anonymous.error = Some(e.user_message());
                self.publish(anonymous);
                Err(e)
            }
        }
    }

    /// Refresh the session with exponential backoff on transient failures.
    ///
    /// Permanent failures and exhausted retries clear the stored session.
    /// Does not publish snapshots; callers decide what the outcome means.
    async fn refresh_with_backoff(&self, refresh_token: &str) -> SessionResult<(User, String)> {
        let mut last_error = None;

        for attempt in 0..self.retry_config.max_retries {
            match self.try_refresh(refresh_token).await {
                Ok(result) => {
                    let _ = self.transition(&SessionMachineInput::RefreshSucceeded);
                    return Ok(result);
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);

                    if attempt + 1 < self.retry_config.max_retries {
                        let _ = self.transition(&SessionMachineInput::RefreshRetry);
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries = self.retry_config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Transient refresh failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Refresh failed permanently, clearing session");
                    let _ = self.credentials.clear_session();
                    let _ = self.transition(&SessionMachineInput::RefreshFailed);
                    return Err(e);
                }
            }
        }

        warn!(
            attempts = self.retry_config.max_retries,
            "Refresh retries exhausted, clearing session"
        );
        let _ = self.credentials.clear_session();
        let _ = self.transition(&SessionMachineInput::RefreshFailed);

        Err(last_error.unwrap_or(SessionError::RefreshExhausted(self.retry_config.max_retries)))
    }

    /// Single refresh attempt: exchange the refresh token, persist the new
    /// session.
    async fn try_refresh(&self, refresh_token: &str) -> SessionResult<(User, String)> {
        let auth = self.api.refresh(refresh_token).await?;

        let user_json = serde_json::to_string(&auth.user)
            .map_err(|e| SessionError::Storage(StorageError::Encoding(e.to_string())))?;
        let meta = SessionMeta {
            user_id: auth.user.id.clone(),
            expires_at: (Utc::now() + chrono::Duration::seconds(auth.expires_in)).to_rfc3339(),
        };
        self.credentials
            .set_session(&auth.access_token, &auth.refresh_token, &user_json, &meta)?;

        info!(user_id = %auth.user.id, "Token refreshed");
        Ok((auth.user, auth.access_token))
    }
}

/// Map an API failure on login/register to the session taxonomy: bare
/// 401/403 responses become a canned invalid-credentials message, anything
/// else keeps the API mapping.
fn auth_error(err: ApiError) -> SessionError {
    match &err {
        ApiError::Status {
            status: 401 | 403,
            message,
        } if message.is_empty() => SessionError::InvalidCredentials(String::new()),
        _ => SessionError::Api(err),
    }
}
