//! Authentication session lifecycle for the Playlet client core.
//!
//! This crate provides:
//! - An explicit FSM for the session lifecycle (uninitialized → initializing
//!   → anonymous/authenticated, with transient authenticating/refreshing/
//!   logging-out states)
//! - [`SessionManager`]: the single source of truth for "who is logged in",
//!   with credential persistence, token refresh with backoff, and atomic
//!   snapshot broadcasting over a watch channel
//! - Client-side form validation that never reaches the network

mod error;
mod session;
mod session_fsm;
mod validate;

pub use error::{SessionError, SessionResult};
pub use session::{Session, SessionManager};
pub use session_fsm::session_machine;
pub use session_fsm::{
    RetryConfig, SessionMachine, SessionMachineInput, SessionMachineState, SessionState,
};
pub use validate::{validate_login, validate_registration, ValidationError};
