//! DTOs for the Playlet backend REST surface.
//!
//! Shapes are owned by the backend; the client deserializes leniently
//! (defaults for optional fields) so additive backend changes don't break
//! older clients.

use serde::{Deserialize, Serialize};

/// User role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Viewer,
    Creator,
    Admin,
}

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Weekly,
    Monthly,
    Yearly,
}

/// Active subscription for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Plan tier
    pub plan: PlanTier,
    /// When the subscription period ends (RFC 3339)
    pub expires_at: String,
    /// Whether the subscription renews automatically
    #[serde(default)]
    pub auto_renew: bool,
}

/// User-controlled playback and notification preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Autoplay the next episode
    pub autoplay: bool,
    /// Preferred subtitle language (BCP 47 tag)
    #[serde(default)]
    pub subtitle_language: Option<String>,
    /// Push notifications enabled
    pub notifications_enabled: bool,
    /// Genres to favor in recommendations
    #[serde(default)]
    pub favorite_genres: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            autoplay: true,
            subtitle_language: None,
            notifications_enabled: true,
            favorite_genres: Vec::new(),
        }
    }
}

/// User record, cached client-side best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User UUID
    pub id: String,
    /// Login name
    pub username: String,
    /// Email address
    pub email: String,
    /// Display name shown in the UI
    #[serde(default)]
    pub display_name: Option<String>,
    /// Role
    #[serde(default)]
    pub role: Role,
    /// Active subscription, if any
    #[serde(default)]
    pub subscription: Option<Subscription>,
    /// Coin balance for unlocking episodes
    #[serde(default)]
    pub coin_balance: i64,
    /// Preferences
    #[serde(default)]
    pub preferences: Preferences,
}

/// A series in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Series UUID
    pub id: String,
    /// Title
    pub title: String,
    /// Short synopsis
    #[serde(default)]
    pub synopsis: String,
    /// Cover image URL
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Genre tags
    #[serde(default)]
    pub genres: Vec<String>,
    /// Total episode count
    #[serde(default)]
    pub episode_count: u32,
    /// Featured on the home screen
    #[serde(default)]
    pub featured: bool,
    /// First release date (RFC 3339)
    #[serde(default)]
    pub released_at: Option<String>,
}

/// A single episode of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Episode UUID
    pub id: String,
    /// Owning series UUID
    pub series_id: String,
    /// 1-based episode number within the series
    pub number: u32,
    /// Episode title
    #[serde(default)]
    pub title: String,
    /// Duration in seconds
    #[serde(default)]
    pub duration_secs: u32,
    /// Playback URL; absent when the episode is locked for this user
    #[serde(default)]
    pub video_url: Option<String>,
    /// Whether the episode requires coins or a subscription
    #[serde(default)]
    pub locked: bool,
    /// Coin price to unlock (0 when free)
    #[serde(default)]
    pub coin_price: u32,
}

/// A watchlist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    /// Series UUID
    pub series_id: String,
    /// When the series was added (RFC 3339)
    pub added_at: String,
}

/// A watch-history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchHistoryEntry {
    /// Episode UUID
    pub episode_id: String,
    /// Owning series UUID
    pub series_id: String,
    /// Last playback position in seconds
    pub position_secs: u32,
    /// When this position was recorded (RFC 3339)
    pub watched_at: String,
}

/// A user's rating of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// Series UUID
    pub series_id: String,
    /// Score, 1-5
    pub score: u8,
    /// Optional free-form review
    #[serde(default)]
    pub review: Option<String>,
}

/// Direction and reason of a coin balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Spend,
    Reward,
}

/// A coin transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinTransaction {
    /// Transaction UUID
    pub id: String,
    /// Signed coin amount (negative for spends)
    pub amount: i64,
    /// Transaction kind
    pub kind: TransactionKind,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// When the transaction happened (RFC 3339)
    pub created_at: String,
}

/// Successful authentication response (login, register, refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for subsequent requests
    pub access_token: String,
    /// Token used to obtain a new access token
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Canonical user record
    pub user: User,
}

/// Login request body.
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Profile update (PATCH) body; only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
}

/// Watch-progress report body.
#[derive(Debug, Clone, Serialize)]
pub struct RecordProgressRequest {
    pub episode_id: String,
    pub series_id: String,
    pub position_secs: u32,
}

/// Rating submission body.
#[derive(Debug, Clone, Serialize)]
pub struct RateRequest {
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

/// Coin spend body (unlocking an episode).
#[derive(Debug, Clone, Serialize)]
pub struct SpendCoinsRequest {
    pub amount: u32,
    pub episode_id: String,
}

/// Error body shape returned by the backend on failures.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
