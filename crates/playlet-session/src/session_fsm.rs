//! Session state machine using rust-fsm.
//!
//! The session lifecycle is an explicit finite state machine rather than a
//! set of booleans derived from storage checks.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │  Uninitialized  │ (initial)
//! └────────┬────────┘
//!          │ InitializeRequested
//!          ▼
//! ┌─────────────────┐  SessionRestored           ┌─────────────────┐
//! │  Initializing   │ ─────────────────────────► │  Authenticated  │
//! └────────┬────────┘                            └───────┬─────────┘
//!          │ NoStoredSession / RestoreFailed             │
//!          │ StoredSessionExpired ──► Refreshing ────────┤ RefreshSucceeded
//!          ▼                              │              │
//! ┌─────────────────┐   RefreshFailed     │              │ LogoutRequested
//! │    Anonymous    │ ◄───────────────────┘              ▼
//! └────────┬────────┘                            ┌─────────────────┐
//!          │ AuthRequested                       │   LoggingOut    │
//!          ▼                                     └───────┬─────────┘
//! ┌─────────────────┐  AuthSucceeded ► Authenticated     │ LogoutComplete
//! │ Authenticating  │  AuthFailed    ► Anonymous         ▼
//! └─────────────────┘                               Anonymous
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Declarative FSM definition. This generates a module `session_machine` with:
// - session_machine::State (enum)
// - session_machine::Input (enum)
// - session_machine::StateMachine (type alias)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Uninitialized)

    Uninitialized => {
        InitializeRequested => Initializing
    },
    Initializing => {
        // Valid credentials on disk
        SessionRestored => Authenticated,
        // Credentials on disk but the access token has lapsed
        StoredSessionExpired => Refreshing,
        // Nothing stored
        NoStoredSession => Anonymous,
        // Storage unreadable or record corrupt
        RestoreFailed => Anonymous
    },
    Anonymous => {
        // Covers both login and register
        AuthRequested => Authenticating
    },
    Authenticating => {
        AuthSucceeded => Authenticated,
        AuthFailed => Anonymous
    },
    Authenticated => {
        TokenExpired => Refreshing,
        LogoutRequested => LoggingOut
    },
    Refreshing => {
        RefreshSucceeded => Authenticated,
        RefreshRetry => Refreshing,
        RefreshFailed => Anonymous
    },
    LoggingOut => {
        LogoutComplete => Anonymous
    }
}

// Re-export the generated types with clearer names
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session state for external consumption (snapshots, screen layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// App just started; stored credentials not yet examined.
    Uninitialized,
    /// Reading stored credentials.
    Initializing,
    /// No valid session.
    Anonymous,
    /// Login or registration in flight.
    Authenticating,
    /// Valid user/token pair present.
    Authenticated,
    /// Refreshing an expired token.
    Refreshing,
    /// Logout in flight.
    LoggingOut,
}

impl SessionState {
    /// Returns true if a valid session is present (Authenticated only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }

    /// Returns true for transient/in-progress states.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionState::Initializing
                | SessionState::Authenticating
                | SessionState::Refreshing
                | SessionState::LoggingOut
        )
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Uninitialized => SessionState::Uninitialized,
            SessionMachineState::Initializing => SessionState::Initializing,
            SessionMachineState::Anonymous => SessionState::Anonymous,
            SessionMachineState::Authenticating => SessionState::Authenticating,
            SessionMachineState::Authenticated => SessionState::Authenticated,
            SessionMachineState::Refreshing => SessionState::Refreshing,
            SessionMachineState::LoggingOut => SessionState::LoggingOut,
        }
    }
}

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms.saturating_mul(2u64.pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_uninitialized() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Uninitialized);
    }

    #[test]
    fn test_initialize_restores_session() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::InitializeRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Initializing);

        machine
            .consume(&SessionMachineInput::SessionRestored)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_initialize_without_stored_session() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::InitializeRequested)
            .unwrap();
        machine
            .consume(&SessionMachineInput::NoStoredSession)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_initialize_restore_failure_degrades_to_anonymous() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::InitializeRequested)
            .unwrap();
        machine.consume(&SessionMachineInput::RestoreFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_initialize_with_expired_session_refreshes() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::InitializeRequested)
            .unwrap();
        machine
            .consume(&SessionMachineInput::StoredSessionExpired)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Refreshing);

        machine
            .consume(&SessionMachineInput::RefreshSucceeded)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_auth_flow_success() {
        let mut machine = anonymous_machine();

        machine.consume(&SessionMachineInput::AuthRequested).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticating);

        machine.consume(&SessionMachineInput::AuthSucceeded).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_auth_flow_failure_returns_to_anonymous() {
        let mut machine = anonymous_machine();

        machine.consume(&SessionMachineInput::AuthRequested).unwrap();
        machine.consume(&SessionMachineInput::AuthFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_cannot_auth_before_initialize() {
        let mut machine = SessionMachine::new();
        let result = machine.consume(&SessionMachineInput::AuthRequested);
        assert!(result.is_err());
    }

    #[test]
    fn test_cannot_auth_while_authenticated() {
        let mut machine = anonymous_machine();
        machine.consume(&SessionMachineInput::AuthRequested).unwrap();
        machine.consume(&SessionMachineInput::AuthSucceeded).unwrap();

        let result = machine.consume(&SessionMachineInput::AuthRequested);
        assert!(result.is_err());
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_logout_flow() {
        let mut machine = anonymous_machine();
        machine.consume(&SessionMachineInput::AuthRequested).unwrap();
        machine.consume(&SessionMachineInput::AuthSucceeded).unwrap();

        machine
            .consume(&SessionMachineInput::LogoutRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::LoggingOut);

        machine
            .consume(&SessionMachineInput::LogoutComplete)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_logout_from_anonymous_is_invalid_transition() {
        let mut machine = anonymous_machine();
        let result = machine.consume(&SessionMachineInput::LogoutRequested);
        assert!(result.is_err());
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_refresh_retry_stays_refreshing() {
        let mut machine = anonymous_machine();
        machine.consume(&SessionMachineInput::AuthRequested).unwrap();
        machine.consume(&SessionMachineInput::AuthSucceeded).unwrap();
        machine.consume(&SessionMachineInput::TokenExpired).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Refreshing);

        machine.consume(&SessionMachineInput::RefreshRetry).unwrap();
        machine.consume(&SessionMachineInput::RefreshRetry).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Refreshing);

        machine
            .consume(&SessionMachineInput::RefreshSucceeded)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_refresh_failure_goes_anonymous() {
        let mut machine = anonymous_machine();
        machine.consume(&SessionMachineInput::AuthRequested).unwrap();
        machine.consume(&SessionMachineInput::AuthSucceeded).unwrap();
        machine.consume(&SessionMachineInput::TokenExpired).unwrap();

        machine.consume(&SessionMachineInput::RefreshFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_session_state_conversion() {
        assert_eq!(
            SessionState::from(&SessionMachineState::Uninitialized),
            SessionState::Uninitialized
        );
        assert_eq!(
            SessionState::from(&SessionMachineState::Authenticated),
            SessionState::Authenticated
        );
        assert_eq!(
            SessionState::from(&SessionMachineState::LoggingOut),
            SessionState::LoggingOut
        );
    }

    #[test]
    fn test_session_state_is_authenticated() {
        assert!(SessionState::Authenticated.is_authenticated());
        assert!(!SessionState::Anonymous.is_authenticated());
        assert!(!SessionState::Refreshing.is_authenticated());
    }

    #[test]
    fn test_session_state_is_transient() {
        assert!(!SessionState::Uninitialized.is_transient());
        assert!(SessionState::Initializing.is_transient());
        assert!(!SessionState::Anonymous.is_transient());
        assert!(SessionState::Authenticating.is_transient());
        assert!(!SessionState::Authenticated.is_transient());
        assert!(SessionState::Refreshing.is_transient());
        assert!(SessionState::LoggingOut.is_transient());
    }

    #[test]
    fn test_retry_config_exponential_backoff() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        // Capped at the ceiling
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(5000));
    }

    fn anonymous_machine() -> SessionMachine {
        let mut machine = SessionMachine::new();
        machine
            .consume(&SessionMachineInput::InitializeRequested)
            .unwrap();
        machine
            .consume(&SessionMachineInput::NoStoredSession)
            .unwrap();
        machine
    }
}
