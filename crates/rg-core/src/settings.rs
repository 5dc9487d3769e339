//! # Settings
//!
//! Persisted user preferences. The system colour scheme is an explicit
//! `watch` source handed in at construction; a listener task keeps the
//! effective theme current and is aborted when the store is dropped.

use crate::error::Result;
use crate::models::SortOrder;
use crate::storage::{keys, Storage};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const MIN_GRID_COLUMNS: u8 = 2;
pub const MAX_GRID_COLUMNS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemePreference {
    Light,
    Dark,
    /// Follow the system colour scheme
    #[default]
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

impl ThemePreference {
    pub fn resolve(self, system: ColorScheme) -> ColorScheme {
        match self {
            ThemePreference::Light => ColorScheme::Light,
            ThemePreference::Dark => ColorScheme::Dark,
            ThemePreference::System => system,
        }
    }
}

/// Stored settings. Fields missing from the stored JSON take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GallerySettings {
    pub theme: ThemePreference,
    pub grid_columns: u8,
    pub auto_cache: bool,
    pub sort_order: SortOrder,
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            theme: ThemePreference::System,
            grid_columns: MIN_GRID_COLUMNS,
            auto_cache: true,
            sort_order: SortOrder::DateDesc,
        }
    }
}

pub struct SettingsStore {
    storage: Storage,
    current: watch::Sender<GallerySettings>,
    system: watch::Receiver<ColorScheme>,
    effective: watch::Receiver<ColorScheme>,
    listener: JoinHandle<()>,
    writes: Mutex<()>,
}

impl SettingsStore {
    /// Loads the stored settings and starts following `system`.
    ///
    /// Unreadable settings degrade to the defaults.
    pub async fn load(storage: Storage, system: watch::Receiver<ColorScheme>) -> Self {
        let mut settings = match storage.get_json::<GallerySettings>(keys::SETTINGS).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "failed to load settings, using defaults");
                GallerySettings::default()
            }
        };
        settings.grid_columns = settings.grid_columns.clamp(MIN_GRID_COLUMNS, MAX_GRID_COLUMNS);
        debug!(?settings, "settings loaded");

        let initial_theme = settings.theme.resolve(*system.borrow());
        let (current, settings_rx) = watch::channel(settings);
        let (effective_tx, effective) = watch::channel(initial_theme);
        let listener = tokio::spawn(track_theme(settings_rx, system.clone(), effective_tx));

        Self {
            storage,
            current,
            system,
            effective,
            listener,
            writes: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> GallerySettings {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GallerySettings> {
        self.current.subscribe()
    }

    /// Theme to render with right now.
    pub fn effective_theme(&self) -> ColorScheme {
        self.current.borrow().theme.resolve(*self.system.borrow())
    }

    /// Receiver of the effective theme, updated on preference or system changes.
    pub fn subscribe_theme(&self) -> watch::Receiver<ColorScheme> {
        self.effective.clone()
    }

    pub async fn update_theme(&self, theme: ThemePreference) -> Result<()> {
        self.update(|settings| settings.theme = theme).await
    }

    /// Stores the column count, clamped to the supported range.
    pub async fn update_grid_columns(&self, columns: u8) -> Result<()> {
        let columns = columns.clamp(MIN_GRID_COLUMNS, MAX_GRID_COLUMNS);
        self.update(|settings| settings.grid_columns = columns).await
    }

    pub async fn update_auto_cache(&self, enabled: bool) -> Result<()> {
        self.update(|settings| settings.auto_cache = enabled).await
    }

    pub async fn update_sort_order(&self, order: SortOrder) -> Result<()> {
        self.update(|settings| settings.sort_order = order).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.update(|settings| *settings = GallerySettings::default()).await
    }

    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut GallerySettings) + Send,
    {
        let _guard = self.writes.lock().await;
        let mut next = self.settings();
        change(&mut next);
        self.storage.set_json(keys::SETTINGS, &next).await?;
        self.current.send_replace(next);
        Ok(())
    }
}

impl Drop for SettingsStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn track_theme(
    mut settings: watch::Receiver<GallerySettings>,
    mut system: watch::Receiver<ColorScheme>,
    effective: watch::Sender<ColorScheme>,
) {
    let mut system_open = true;
    loop {
        let next = settings.borrow_and_update().theme.resolve(*system.borrow_and_update());
        effective.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });

        tokio::select! {
            changed = settings.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = system.changed(), if system_open => {
                if changed.is_err() {
                    system_open = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(storage: Storage) -> (SettingsStore, watch::Sender<ColorScheme>) {
        let (system_tx, system_rx) = watch::channel(ColorScheme::Light);
        (SettingsStore::load(storage, system_rx).await, system_tx)
    }

    #[tokio::test]
    async fn test_defaults_when_nothing_stored() {
        let (store, _system) = store_with(Storage::in_memory()).await;
        assert_eq!(store.settings(), GallerySettings::default());
        assert_eq!(store.effective_theme(), ColorScheme::Light);
    }

    #[tokio::test]
    async fn test_partial_settings_merge_over_defaults() {
        let storage = Storage::in_memory();
        storage
            .set_str(keys::SETTINGS, r#"{"grid_columns": 9, "sort_order": "size_asc"}"#)
            .await
            .unwrap();
        let (store, _system) = store_with(storage).await;

        let settings = store.settings();
        assert_eq!(settings.grid_columns, MAX_GRID_COLUMNS);
        assert_eq!(settings.sort_order, SortOrder::SizeAsc);
        assert!(settings.auto_cache);
    }

    #[tokio::test]
    async fn test_malformed_settings_degrade_to_defaults() {
        let storage = Storage::in_memory();
        storage.set_str(keys::SETTINGS, "[1, 2]").await.unwrap();
        let (store, _system) = store_with(storage).await;
        assert_eq!(store.settings(), GallerySettings::default());
    }

    #[tokio::test]
    async fn test_updates_persist() {
        let storage = Storage::in_memory();
        let (store, _system) = store_with(storage.clone()).await;
        store.update_grid_columns(1).await.unwrap();
        store.update_auto_cache(false).await.unwrap();
        store.update_sort_order(SortOrder::DateAsc).await.unwrap();
        assert_eq!(store.settings().grid_columns, MIN_GRID_COLUMNS);

        let (reloaded, _system) = store_with(storage).await;
        let settings = reloaded.settings();
        assert!(!settings.auto_cache);
        assert_eq!(settings.sort_order, SortOrder::DateAsc);

        reloaded.reset().await.unwrap();
        assert_eq!(reloaded.settings(), GallerySettings::default());
    }

    #[tokio::test]
    async fn test_effective_theme_follows_system_only_when_asked() {
        let (store, system) = store_with(Storage::in_memory()).await;
        let mut theme = store.subscribe_theme();

        system.send_replace(ColorScheme::Dark);
        theme.changed().await.unwrap();
        assert_eq!(*theme.borrow_and_update(), ColorScheme::Dark);
        assert_eq!(store.effective_theme(), ColorScheme::Dark);

        store.update_theme(ThemePreference::Light).await.unwrap();
        theme.changed().await.unwrap();
        assert_eq!(*theme.borrow_and_update(), ColorScheme::Light);

        system.send_replace(ColorScheme::Light);
        system.send_replace(ColorScheme::Dark);
        assert_eq!(store.effective_theme(), ColorScheme::Light);
    }

    #[tokio::test]
    async fn test_drop_stops_listener() {
        let (store, _system) = store_with(Storage::in_memory()).await;
        let mut theme = store.subscribe_theme();
        drop(store);
        assert!(theme.changed().await.is_err());
    }
}
