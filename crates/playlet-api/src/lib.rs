//! REST API client for the Playlet backend.
//!
//! This crate provides:
//! - [`ApiClient`]: a thin reqwest wrapper with bearer-token auth, a global
//!   request timeout, and JSON error-body mapping
//! - One typed method per backend operation (auth, profile, catalog,
//!   watchlist, history, ratings, subscriptions, coins)
//! - The DTOs shared by the session and cache layers

mod client;
mod endpoints;
mod error;
mod types;

pub use client::ApiClient;
pub use endpoints::SeriesFilter;
pub use error::{ApiError, ApiResult};
pub use types::{
    AuthResponse, CoinTransaction, Episode, LoginRequest, PlanTier, Preferences, ProfilePatch,
    RateRequest, Rating, RecordProgressRequest, RegisterRequest, Role, Series, SpendCoinsRequest,
    Subscription, TransactionKind, User, WatchHistoryEntry, WatchlistItem,
};
