//! Composition root for the Playlet client core.
//!
//! [`PlayletClient`] wires configuration, the credential store, the API
//! client, the session manager, and the query cache into one handle the
//! embedding app owns. The screen layer's data hooks map onto the keyed
//! read helpers here; writes go through the retrying mutation path and
//! invalidate exactly the keys they affect.

mod client;

pub use client::{ClientError, PlayletClient};

// Re-export the surface the embedder needs without extra imports.
pub use playlet_api::{
    ApiClient, Episode, Preferences, ProfilePatch, RegisterRequest, Series, SeriesFilter,
    Subscription, User,
};
pub use playlet_cache::{QueryClient, QueryConfig, QueryError, QueryKey, QueryObserver};
pub use playlet_config::{Config, Paths};
pub use playlet_session::{Session, SessionManager, SessionState};
