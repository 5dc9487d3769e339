//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Implementations stay dumb: one call is one round trip, with retry,
//! cancellation and normalization handled by the core.

use crate::error::Result;
use crate::models::{PageQuery, RawFeedResponse};
use async_trait::async_trait;

/// Remote image listing contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetches one page of the listing. Fails with `Network`, `Http` or
    /// `Parse`; dropping the returned future aborts the request.
    async fn fetch_page(&self, query: &PageQuery) -> Result<RawFeedResponse>;
}

/// Persistent string-keyed storage contract.
///
/// Writes to the same key are serialized by the implementation; writes to
/// different keys carry no ordering guarantee.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    /// Removes every key.
    async fn clear(&self) -> Result<()>;
    /// Enumerates every stored key, in no particular order.
    async fn keys(&self) -> Result<Vec<String>>;
}
