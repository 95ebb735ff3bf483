//! Request/cache layer for the Playlet client core.
//!
//! [`QueryClient`] sits between the screen layer's data hooks and the HTTP
//! client, providing:
//!
//! - **Stale-while-revalidate**: entries younger than the staleness window
//!   are served without a network call; older entries are served immediately
//!   while exactly one background refetch runs.
//! - **De-duplication**: concurrent reads of the same key collapse into a
//!   single in-flight network call; every waiter receives the same result.
//! - **Retry**: transient failures retry once with exponential, capped
//!   delay; permanent failures surface immediately.
//! - **Garbage collection**: entries with no active observer beyond the GC
//!   window are swept by a background task.
//!
//! Failures on one key never invalidate another key's cached data.

mod client;
mod error;
mod key;
mod retry;

pub use client::{QueryClient, QueryConfig, QueryObserver};
pub use error::{QueryError, QueryResult};
pub use key::QueryKey;
pub use retry::RetryPolicy;
