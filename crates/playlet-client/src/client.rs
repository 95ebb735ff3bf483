//! Client handle wiring the subsystems together.

use playlet_api::{
    ApiClient, CoinTransaction, Episode, RateRequest, Rating, RecordProgressRequest, Series,
    SeriesFilter, SpendCoinsRequest, Subscription, WatchHistoryEntry, WatchlistItem,
};
use playlet_cache::{QueryClient, QueryConfig, QueryError, QueryKey, QueryObserver, QueryResult};
use playlet_config::{Config, ConfigError, Paths};
use playlet_session::{Session, SessionError, SessionManager};
use playlet_storage::{CredentialStore, FileStore, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type for client construction.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] playlet_storage::StorageError),

    /// API client error
    #[error("API error: {0}")]
    Api(#[from] playlet_api::ApiError),
}

/// The app-wide client handle.
///
/// Owns every subsystem behind `Arc` so the embedder can hand pieces to
/// whatever needs them; there is no process-wide global.
pub struct PlayletClient {
    config: Arc<Config>,
    api: Arc<ApiClient>,
    session: Arc<SessionManager>,
    queries: QueryClient,
}

impl PlayletClient {
    /// Build a client with the file-backed credential store under the given
    /// paths.
    pub fn new(config: Config, paths: &Paths) -> Result<Self, ClientError> {
        let store = FileStore::new(paths.credentials_file())?;
        Self::with_store(config, Box::new(store))
    }

    /// Build a client over any storage backend (tests inject a memory
    /// store here).
    pub fn with_store(
        config: Config,
        store: Box<dyn KeyValueStore>,
    ) -> Result<Self, ClientError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let api = Arc::new(ApiClient::new(config.api_base_url.clone(), timeout)?);
        let credentials = CredentialStore::new(store);
        let session = Arc::new(SessionManager::new(credentials, (*api).clone()));
        let queries = QueryClient::new(QueryConfig::default());

        Ok(Self {
            config: Arc::new(config),
            api,
            session,
            queries,
        })
    }

    /// Restore the session from storage and start the cache sweeper. Call
    /// once at app start.
    pub async fn initialize(&self) -> Session {
        self.queries.start_gc();
        self.session.initialize().await
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The session manager.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// The query cache.
    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    /// The raw API client.
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// Pin a key's cache entry while a screen observes it.
    pub fn observe(&self, key: QueryKey) -> QueryObserver {
        self.queries.observe(key)
    }

    // ==========================================
    // Query keys
    // ==========================================

    fn series_key(filter: &SeriesFilter) -> QueryKey {
        let mut key = QueryKey::new("series");
        if let Some(genre) = &filter.genre {
            key = key.with("genre", genre.clone());
        }
        if let Some(featured) = filter.featured {
            key = key.with("featured", featured.to_string());
        }
        key
    }

    fn series_detail_key(series_id: &str) -> QueryKey {
        QueryKey::new("series_detail").with("id", series_id)
    }

    fn episodes_key(series_id: &str) -> QueryKey {
        QueryKey::new("episodes").with("series_id", series_id)
    }

    fn watchlist_key() -> QueryKey {
        QueryKey::new("watchlist")
    }

    fn history_key() -> QueryKey {
        QueryKey::new("history")
    }

    fn subscription_key() -> QueryKey {
        QueryKey::new("subscription")
    }

    fn coin_transactions_key() -> QueryKey {
        QueryKey::new("coin_transactions")
    }

    // ==========================================
    // Reads
    // ==========================================

    /// List series, cached per filter.
    pub async fn series(&self, filter: SeriesFilter) -> QueryResult<Arc<Vec<Series>>> {
        let api = self.api.clone();
        self.queries
            .fetch(Self::series_key(&filter), move || {
                let api = api.clone();
                let filter = filter.clone();
                async move { api.list_series(&filter).await.map_err(QueryError::from) }
            })
            .await
    }

    /// A single series.
    pub async fn series_detail(&self, series_id: &str) -> QueryResult<Arc<Series>> {
        let api = self.api.clone();
        let id = series_id.to_string();
        self.queries
            .fetch(Self::series_detail_key(series_id), move || {
                let api = api.clone();
                let id = id.clone();
                async move { api.get_series(&id).await.map_err(QueryError::from) }
            })
            .await
    }

    /// A series' episodes. Sends the bearer token when signed in so
    /// entitled playback URLs come back unlocked.
    pub async fn episodes(&self, series_id: &str) -> QueryResult<Arc<Vec<Episode>>> {
        let api = self.api.clone();
        let session = self.session.clone();
        let id = series_id.to_string();
        self.queries
            .fetch(Self::episodes_key(series_id), move || {
                let api = api.clone();
                let session = session.clone();
                let id = id.clone();
                async move {
                    let token = session.get_valid_token().await.ok();
                    api.list_episodes(&id, token.as_deref())
                        .await
                        .map_err(QueryError::from)
                }
            })
            .await
    }

    /// The signed-in user's watchlist.
    pub async fn watchlist(&self) -> QueryResult<Arc<Vec<WatchlistItem>>> {
        let api = self.api.clone();
        let session = self.session.clone();
        self.queries
            .fetch(Self::watchlist_key(), move || {
                let api = api.clone();
                let session = session.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.list_watchlist(&token).await.map_err(QueryError::from)
                }
            })
            .await
    }

    /// The signed-in user's watch history.
    pub async fn history(&self) -> QueryResult<Arc<Vec<WatchHistoryEntry>>> {
        let api = self.api.clone();
        let session = self.session.clone();
        self.queries
            .fetch(Self::history_key(), move || {
                let api = api.clone();
                let session = session.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.list_history(&token).await.map_err(QueryError::from)
                }
            })
            .await
    }

    /// The signed-in user's subscription, if any.
    pub async fn subscription(&self) -> QueryResult<Arc<Option<Subscription>>> {
        let api = self.api.clone();
        let session = self.session.clone();
        self.queries
            .fetch(Self::subscription_key(), move || {
                let api = api.clone();
                let session = session.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.get_subscription(&token).await.map_err(QueryError::from)
                }
            })
            .await
    }

    /// The signed-in user's coin transactions.
    pub async fn coin_transactions(&self) -> QueryResult<Arc<Vec<CoinTransaction>>> {
        let api = self.api.clone();
        let session = self.session.clone();
        self.queries
            .fetch(Self::coin_transactions_key(), move || {
                let api = api.clone();
                let session = session.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.list_coin_transactions(&token)
                        .await
                        .map_err(QueryError::from)
                }
            })
            .await
    }

    /// Ask the backend to send a password-reset email. Stateless; no
    /// session involvement.
    pub async fn request_password_reset(&self, email: &str) -> QueryResult<()> {
        let api = self.api.clone();
        let email = email.to_string();
        self.queries
            .mutate(move || {
                let api = api.clone();
                let email = email.clone();
                async move {
                    api.request_password_reset(&email)
                        .await
                        .map_err(QueryError::from)
                }
            })
            .await
    }

    // ==========================================
    // Writes
    // ==========================================

    /// Add a series to the watchlist and invalidate the cached list.
    pub async fn add_to_watchlist(&self, series_id: &str) -> QueryResult<()> {
        let api = self.api.clone();
        let session = self.session.clone();
        let id = series_id.to_string();
        self.queries
            .mutate(move || {
                let api = api.clone();
                let session = session.clone();
                let id = id.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.add_to_watchlist(&token, &id)
                        .await
                        .map_err(QueryError::from)
                }
            })
            .await?;
        self.queries.invalidate(&Self::watchlist_key());
        Ok(())
    }

    /// Remove a series from the watchlist and invalidate the cached list.
    pub async fn remove_from_watchlist(&self, series_id: &str) -> QueryResult<()> {
        let api = self.api.clone();
        let session = self.session.clone();
        let id = series_id.to_string();
        self.queries
            .mutate(move || {
                let api = api.clone();
                let session = session.clone();
                let id = id.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.remove_from_watchlist(&token, &id)
                        .await
                        .map_err(QueryError::from)
                }
            })
            .await?;
        self.queries.invalidate(&Self::watchlist_key());
        Ok(())
    }

    /// Record a playback position and invalidate the cached history.
    pub async fn record_progress(&self, req: RecordProgressRequest) -> QueryResult<()> {
        let api = self.api.clone();
        let session = self.session.clone();
        self.queries
            .mutate(move || {
                let api = api.clone();
                let session = session.clone();
                let req = req.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.record_progress(&token, &req)
                        .await
                        .map_err(QueryError::from)
                }
            })
            .await?;
        self.queries.invalidate(&Self::history_key());
        Ok(())
    }

    /// Rate a series and invalidate its cached detail.
    pub async fn rate_series(
        &self,
        series_id: &str,
        score: u8,
        review: Option<String>,
    ) -> QueryResult<Rating> {
        let api = self.api.clone();
        let session = self.session.clone();
        let id = series_id.to_string();
        let req = RateRequest { score, review };
        let rating = self
            .queries
            .mutate(move || {
                let api = api.clone();
                let session = session.clone();
                let id = id.clone();
                let req = req.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.rate_series(&token, &id, &req)
                        .await
                        .map_err(QueryError::from)
                }
            })
            .await?;
        self.queries.invalidate(&Self::series_detail_key(series_id));
        Ok(rating)
    }

    /// Spend coins to unlock an episode. Invalidate the transaction list and
    /// the affected series' episodes, and refresh the user record so the
    /// coin balance follows.
    pub async fn spend_coins(
        &self,
        episode_id: &str,
        series_id: &str,
        amount: u32,
    ) -> QueryResult<CoinTransaction> {
        let api = self.api.clone();
        let session = self.session.clone();
        let req = SpendCoinsRequest {
            amount,
            episode_id: episode_id.to_string(),
        };
        let tx = self
            .queries
            .mutate(move || {
                let api = api.clone();
                let session = session.clone();
                let req = req.clone();
                async move {
                    let token = require_token(&session).await?;
                    api.spend_coins(&token, &req).await.map_err(QueryError::from)
                }
            })
            .await?;

        self.queries.invalidate(&Self::coin_transactions_key());
        self.queries.invalidate(&Self::episodes_key(series_id));
        self.session.reload_profile().await;
        Ok(tx)
    }
}

/// Map the session's token API into the query error space.
async fn require_token(session: &SessionManager) -> QueryResult<String> {
    session.get_valid_token().await.map_err(session_error)
}

fn session_error(err: SessionError) -> QueryError {
    QueryError::Request {
        transient: err.is_transient(),
        message: err.to_string(),
    }
}
