//! Typed wrappers for the backend REST surface.
//!
//! One method per backend operation. Paths are the client's knowledge; the
//! exact response shapes are owned by the backend (see `types.rs`).

use crate::client::ApiClient;
use crate::error::ApiResult;
use crate::types::{
    AuthResponse, CoinTransaction, Episode, LoginRequest, ProfilePatch, RateRequest, Rating,
    RecordProgressRequest, RegisterRequest, Series, SpendCoinsRequest, Subscription, User,
    WatchHistoryEntry, WatchlistItem,
};
use reqwest::Method;
use serde_json::json;

/// Catalog listing filter.
#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    /// Only series tagged with this genre
    pub genre: Option<String>,
    /// Only featured series
    pub featured: Option<bool>,
}

impl SeriesFilter {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(genre) = &self.genre {
            params.push(("genre", genre.clone()));
        }
        if let Some(featured) = self.featured {
            params.push(("featured", featured.to_string()));
        }
        params
    }
}

impl ApiClient {
    // ==========================================
    // Authentication
    // ==========================================

    /// Authenticate with username and password.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<AuthResponse> {
        tracing::debug!(username = %username, "Attempting login");
        self.execute_json(
            Method::POST,
            "auth/login",
            None,
            &LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    /// Create a new account.
    pub async fn register(&self, req: &RegisterRequest) -> ApiResult<AuthResponse> {
        tracing::debug!(username = %req.username, "Attempting registration");
        self.execute_json(Method::POST, "auth/register", None, req)
            .await
    }

    /// Invalidate the session server-side.
    pub async fn logout(&self, access_token: &str) -> ApiResult<()> {
        self.execute_empty(self.request(Method::POST, "auth/logout", Some(access_token)))
            .await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<AuthResponse> {
        self.execute_json(
            Method::POST,
            "auth/refresh",
            None,
            &json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    /// Request a password-reset email.
    pub async fn request_password_reset(&self, email: &str) -> ApiResult<()> {
        self.execute_empty(
            self.request(Method::POST, "auth/password-reset", None)
                .json(&json!({ "email": email })),
        )
        .await
    }

    // ==========================================
    // Profile
    // ==========================================

    /// Fetch the authenticated user's canonical record.
    pub async fn get_profile(&self, access_token: &str) -> ApiResult<User> {
        self.execute(self.request(Method::GET, "users/me", Some(access_token)))
            .await
    }

    /// Patch the authenticated user's profile; returns the canonical record.
    pub async fn update_profile(
        &self,
        access_token: &str,
        patch: &ProfilePatch,
    ) -> ApiResult<User> {
        self.execute_json(Method::PATCH, "users/me", Some(access_token), patch)
            .await
    }

    // ==========================================
    // Catalog
    // ==========================================

    /// List series, optionally filtered.
    pub async fn list_series(&self, filter: &SeriesFilter) -> ApiResult<Vec<Series>> {
        self.execute(
            self.request(Method::GET, "series", None)
                .query(&filter.query()),
        )
        .await
    }

    /// Fetch a single series.
    pub async fn get_series(&self, series_id: &str) -> ApiResult<Series> {
        self.execute(self.request(Method::GET, &format!("series/{series_id}"), None))
            .await
    }

    /// List a series' episodes. The token, when present, unlocks playback
    /// URLs the user is entitled to.
    pub async fn list_episodes(
        &self,
        series_id: &str,
        access_token: Option<&str>,
    ) -> ApiResult<Vec<Episode>> {
        self.execute(self.request(
            Method::GET,
            &format!("series/{series_id}/episodes"),
            access_token,
        ))
        .await
    }

    /// Fetch a single episode.
    pub async fn get_episode(
        &self,
        episode_id: &str,
        access_token: Option<&str>,
    ) -> ApiResult<Episode> {
        self.execute(self.request(Method::GET, &format!("episodes/{episode_id}"), access_token))
            .await
    }

    // ==========================================
    // Watchlist
    // ==========================================

    /// List the user's watchlist.
    pub async fn list_watchlist(&self, access_token: &str) -> ApiResult<Vec<WatchlistItem>> {
        self.execute(self.request(Method::GET, "watchlist", Some(access_token)))
            .await
    }

    /// Add a series to the watchlist.
    pub async fn add_to_watchlist(&self, access_token: &str, series_id: &str) -> ApiResult<()> {
        self.execute_empty(
            self.request(Method::POST, "watchlist", Some(access_token))
                .json(&json!({ "series_id": series_id })),
        )
        .await
    }

    /// Remove a series from the watchlist.
    pub async fn remove_from_watchlist(
        &self,
        access_token: &str,
        series_id: &str,
    ) -> ApiResult<()> {
        self.execute_empty(self.request(
            Method::DELETE,
            &format!("watchlist/{series_id}"),
            Some(access_token),
        ))
        .await
    }

    // ==========================================
    // Watch history
    // ==========================================

    /// List the user's watch history, most recent first.
    pub async fn list_history(&self, access_token: &str) -> ApiResult<Vec<WatchHistoryEntry>> {
        self.execute(self.request(Method::GET, "history", Some(access_token)))
            .await
    }

    /// Record a playback position.
    pub async fn record_progress(
        &self,
        access_token: &str,
        req: &RecordProgressRequest,
    ) -> ApiResult<()> {
        self.execute_empty(
            self.request(Method::POST, "history", Some(access_token))
                .json(req),
        )
        .await
    }

    // ==========================================
    // Ratings, subscription, coins
    // ==========================================

    /// Rate a series; returns the stored rating.
    pub async fn rate_series(
        &self,
        access_token: &str,
        series_id: &str,
        req: &RateRequest,
    ) -> ApiResult<Rating> {
        self.execute_json(
            Method::PUT,
            &format!("series/{series_id}/rating"),
            Some(access_token),
            req,
        )
        .await
    }

    /// Fetch the user's current subscription, if any.
    pub async fn get_subscription(&self, access_token: &str) -> ApiResult<Option<Subscription>> {
        self.execute(self.request(Method::GET, "subscriptions/me", Some(access_token)))
            .await
    }

    /// List coin transactions, most recent first.
    pub async fn list_coin_transactions(
        &self,
        access_token: &str,
    ) -> ApiResult<Vec<CoinTransaction>> {
        self.execute(self.request(Method::GET, "coins/transactions", Some(access_token)))
            .await
    }

    /// Spend coins to unlock an episode; returns the resulting transaction.
    pub async fn spend_coins(
        &self,
        access_token: &str,
        req: &SpendCoinsRequest,
    ) -> ApiResult<CoinTransaction> {
        self.execute_json(Method::POST, "coins/spend", Some(access_token), req)
            .await
    }
}
