//! Storage key constants.

/// Storage keys used by the client core.
///
/// All keys carry the `playlet.` prefix so the store can share a namespace
/// with other consumers without collisions.
pub struct StorageKeys;

impl StorageKeys {
    /// API access token
    pub const ACCESS_TOKEN: &'static str = "playlet.access_token";

    /// API refresh token
    pub const REFRESH_TOKEN: &'static str = "playlet.refresh_token";

    /// Cached user record (JSON)
    pub const USER_RECORD: &'static str = "playlet.user_record";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "playlet.session_meta";
}
