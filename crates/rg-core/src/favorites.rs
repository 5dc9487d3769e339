//! # Favorites Ledger
//!
//! Source of truth for favorite status. The full favorites list is
//! persisted under [`keys::FAVORITES`] and mirrored in memory so that
//! membership checks never touch storage.

use crate::error::Result;
use crate::models::{FavoriteEntry, GalleryItem, Image};
use crate::storage::{keys, Storage};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct FavoritesLedger {
    storage: Storage,
    mirror: RwLock<Vec<FavoriteEntry>>,
    /// Serializes read-modify-persist cycles.
    writes: Mutex<()>,
}

impl FavoritesLedger {
    /// Creates an empty ledger. Call [`load`](Self::load) before the first
    /// [`is_favorite`](Self::is_favorite) query.
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            mirror: RwLock::new(Vec::new()),
            writes: Mutex::new(()),
        }
    }

    /// Loads the persisted favorites into the mirror.
    ///
    /// A missing, unreadable or malformed list degrades to an empty one.
    pub async fn load(&self) -> Vec<Image> {
        let _guard = self.writes.lock().await;
        let mut entries = match self.storage.get_json::<Vec<FavoriteEntry>>(keys::FAVORITES).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "failed to load favorites, starting empty");
                Vec::new()
            }
        };

        let mut seen = std::collections::HashSet::new();
        entries.retain(|entry| seen.insert(entry.id.clone()));
        debug!(count = entries.len(), "favorites loaded");

        *self.write_mirror() = entries.clone();
        entries.into_iter().map(Image::from).collect()
    }

    /// Adds `image`; already-favorited images are left untouched.
    pub async fn add(&self, image: &Image) -> Result<()> {
        self.mutate(|entries| {
            if entries.iter().any(|entry| entry.id == image.id) {
                return false;
            }
            entries.push(FavoriteEntry::from(image));
            true
        })
        .await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.mutate(|entries| {
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            entries.len() != before
        })
        .await
    }

    /// Removes `image` when present, adds it otherwise. Returns the new status.
    pub async fn toggle(&self, image: &Image) -> Result<bool> {
        let mut now_favorite = false;
        self.mutate(|entries| {
            let before = entries.len();
            entries.retain(|entry| entry.id != image.id);
            if entries.len() == before {
                entries.push(FavoriteEntry::from(image));
                now_favorite = true;
            }
            true
        })
        .await?;
        Ok(now_favorite)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.mutate(|entries| {
            entries.clear();
            true
        })
        .await
    }

    /// Membership check against the in-memory mirror. Never performs I/O.
    pub fn is_favorite(&self, id: &str) -> bool {
        self.read_mirror().iter().any(|entry| entry.id == id)
    }

    /// Snapshot of the favorites in the order they were added.
    pub fn favorites(&self) -> Vec<Image> {
        self.read_mirror().iter().cloned().map(Image::from).collect()
    }

    pub fn count(&self) -> usize {
        self.read_mirror().len()
    }

    /// Pairs each image with its favorite flag.
    pub fn overlay(&self, images: &[Image]) -> Vec<GalleryItem> {
        let mirror = self.read_mirror();
        images
            .iter()
            .map(|image| GalleryItem {
                is_favorite: mirror.iter().any(|entry| entry.id == image.id),
                image: image.clone(),
            })
            .collect()
    }

    /// Applies `change` to a copy of the list and, if it reports a change,
    /// persists the copy before publishing it to the mirror.
    async fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<FavoriteEntry>) -> bool + Send,
    {
        let _guard = self.writes.lock().await;
        let mut next = self.read_mirror().clone();
        if !change(&mut next) {
            return Ok(());
        }

        self.storage.set_json(keys::FAVORITES, &next).await?;
        debug!(count = next.len(), "favorites persisted");
        *self.write_mirror() = next;
        Ok(())
    }

    fn read_mirror(&self) -> RwLockReadGuard<'_, Vec<FavoriteEntry>> {
        self.mirror.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_mirror(&self) -> RwLockWriteGuard<'_, Vec<FavoriteEntry>> {
        self.mirror.write().unwrap_or_else(PoisonError::into_inner)
    }
}
