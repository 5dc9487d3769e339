//! # Cache Metadata Ledger
//!
//! Tracks the size and expiry of cached image payloads under
//! `image_cache_{id}` keys. Expired entries are logically absent: reads
//! evict them lazily and [`CacheLedger::sweep_expired`] removes them in bulk.

use crate::error::Result;
use crate::models::CacheMetadataEntry;
use crate::storage::{keys, ScopedStorage, Storage};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default lifetime of a cached payload.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub struct CacheLedger {
    entries: ScopedStorage,
}

impl CacheLedger {
    pub fn new(storage: &Storage) -> Self {
        Self {
            entries: storage.scoped(keys::IMAGE_CACHE_PREFIX),
        }
    }

    /// Records `size` cached bytes for `id`, expiring `ttl` from now.
    pub async fn put(&self, id: &str, size: u64, ttl: Duration) -> Result<CacheMetadataEntry> {
        let now = Utc::now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheMetadataEntry {
            timestamp: now,
            expires_at,
            size,
        };
        self.entries.set_json(id, &entry).await?;
        Ok(entry)
    }

    /// Live entry for `id`. An expired entry is deleted and reported absent.
    pub async fn get(&self, id: &str) -> Result<Option<CacheMetadataEntry>> {
        let Some(entry) = self.entries.get_json::<CacheMetadataEntry>(id).await? else {
            return Ok(None);
        };
        if entry.is_expired(Utc::now()) {
            debug!(image_id = id, "evicting expired cache entry");
            self.entries.remove(id).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// Entries that cannot be read or removed are skipped.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for id in self.entries.ids().await? {
            match self.entries.get_json::<CacheMetadataEntry>(&id).await {
                Ok(Some(entry)) if entry.is_expired(now) => match self.entries.remove(&id).await {
                    Ok(()) => removed += 1,
                    Err(err) => warn!(image_id = %id, error = %err, "failed to remove expired cache entry"),
                },
                Ok(_) => {}
                Err(err) => warn!(image_id = %id, error = %err, "skipping unreadable cache entry"),
            }
        }
        if removed > 0 {
            info!(removed, "expired cache entries swept");
        }
        Ok(removed)
    }

    /// Total cached bytes over live entries. Unreadable entries count as zero.
    pub async fn total_size(&self) -> Result<u64> {
        let now = Utc::now();
        let mut total = 0u64;
        for id in self.entries.ids().await? {
            match self.entries.get_json::<CacheMetadataEntry>(&id).await {
                Ok(Some(entry)) if !entry.is_expired(now) => total = total.saturating_add(entry.size),
                Ok(_) => {}
                Err(err) => warn!(image_id = %id, error = %err, "skipping unreadable cache entry"),
            }
        }
        Ok(total)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.entries.clear().await
    }

    /// Runs [`sweep_expired`](Self::sweep_expired) every `period` until
    /// `shutdown` is cancelled.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep_expired().await {
                            warn!(error = %err, "periodic cache sweep failed");
                        }
                    }
                }
            }
            debug!("cache sweeper stopped");
        })
    }
}

/// Human readable byte count: `0 B`, `512 B`, `1.5 KB`, `3 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, UNITS[unit])
    } else {
        format!("{rounded:.1} {}", UNITS[unit])
    }
}
