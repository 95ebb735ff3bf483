//! Device-local persistence for the Playlet client core.
//!
//! This crate provides:
//! - A [`KeyValueStore`] trait matching the persistent store contract
//!   (namespaced string keys, string values)
//! - A file-backed implementation ([`FileStore`]) and an in-memory one
//!   ([`MemoryStore`])
//! - A high-level [`CredentialStore`] for tokens, the cached user record,
//!   and session expiry metadata

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::{CredentialStore, SessionMeta};
pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
