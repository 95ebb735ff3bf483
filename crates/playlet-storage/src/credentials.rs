//! High-level API for persisted credentials.

use crate::{KeyValueStore, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};

/// Seconds of remaining lifetime below which a session counts as expired.
/// Gives in-flight requests headroom before the token actually lapses.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Persisted session metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// User ID the stored tokens belong to
    pub user_id: String,
    /// When the access token expires (RFC 3339 timestamp)
    pub expires_at: String,
}

/// High-level API for storing and retrieving session credentials.
///
/// Owns a [`KeyValueStore`] backend and is the sole writer of the auth keys,
/// so plain last-writer-wins semantics in the backend are sufficient.
pub struct CredentialStore {
    store: Box<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Create a new credential store with the given backend.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Store the access token
    pub fn set_access_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::ACCESS_TOKEN, token)
    }

    /// Retrieve the access token
    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::ACCESS_TOKEN)
    }

    /// Store the refresh token
    pub fn set_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::REFRESH_TOKEN, token)
    }

    /// Retrieve the refresh token
    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::REFRESH_TOKEN)
    }

    /// Store the serialized user record (opaque JSON owned by the caller)
    pub fn set_user_record(&self, user_json: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::USER_RECORD, user_json)
    }

    /// Retrieve the serialized user record
    pub fn get_user_record(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::USER_RECORD)
    }

    /// Store session metadata
    pub fn set_session_meta(&self, meta: &SessionMeta) -> StorageResult<()> {
        let json =
            serde_json::to_string(meta).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.store.set(StorageKeys::SESSION_META, &json)
    }

    /// Retrieve session metadata
    pub fn get_session_meta(&self) -> StorageResult<Option<SessionMeta>> {
        match self.store.get(StorageKeys::SESSION_META)? {
            Some(json) => {
                let meta: SessionMeta = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Check if a stored session exists.
    ///
    /// Requires both the access token and the user record so a partially
    /// written session never reads as logged in.
    pub fn has_session(&self) -> StorageResult<bool> {
        let has_token = self.store.has(StorageKeys::ACCESS_TOKEN)?;
        let has_user = self.store.has(StorageKeys::USER_RECORD)?;
        Ok(has_token && has_user)
    }

    /// Check if the stored session is expired (or close enough to count).
    pub fn is_session_expired(&self) -> StorageResult<bool> {
        match self.get_session_meta()? {
            Some(meta) => {
                let expires_at = chrono::DateTime::parse_from_rfc3339(&meta.expires_at)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                let now = chrono::Utc::now();
                Ok(expires_at.signed_duration_since(now).num_seconds() < EXPIRY_MARGIN_SECS)
            }
            None => Ok(true),
        }
    }

    /// Store a complete session (tokens + user record + metadata).
    pub fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_json: &str,
        meta: &SessionMeta,
    ) -> StorageResult<()> {
        self.set_access_token(access_token)?;
        self.set_refresh_token(refresh_token)?;
        self.set_user_record(user_json)?;
        self.set_session_meta(meta)?;
        tracing::debug!(user_id = %meta.user_id, "Stored session credentials");
        Ok(())
    }

    /// Clear the stored session.
    ///
    /// Individual delete failures are ignored; logout must always win.
    pub fn clear_session(&self) -> StorageResult<()> {
        let _ = self.store.delete(StorageKeys::ACCESS_TOKEN);
        let _ = self.store.delete(StorageKeys::REFRESH_TOKEN);
        let _ = self.store.delete(StorageKeys::USER_RECORD);
        let _ = self.store.delete(StorageKeys::SESSION_META);
        tracing::debug!("Cleared stored session credentials");
        Ok(())
    }
}
