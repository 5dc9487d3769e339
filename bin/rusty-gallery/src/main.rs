//! # Rusty-Gallery Binary
//!
//! Assembles the gallery from compile-time selected plugins, pulls the
//! first pages of the feed and reports what it found.

mod config;

use anyhow::Context;
use config::AppConfig;
use rg_core::{
    format_size, CacheLedger, ColorScheme, FavoritesLedger, FeedClient, GalleryFeed,
    RetryingFetcher, SettingsStore, Storage, ViewerController,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Feature-gated imports: plugins are selected at compile time
#[cfg(feature = "feed-http")]
use rg_feed_http::{FeedEndpoint, HttpFeedClient};

#[cfg(feature = "kv-sqlite")]
use rg_kv_sqlite::SqliteKvStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    // 2. Logging
    init_tracing(config.log.json);
    info!(page_size = config.feed.page_size, "rusty-gallery starting");

    // 3. Key-value storage
    let storage = open_storage(&config).await?;

    // 4. Settings and favorites
    // No desktop integration here, so the system scheme stays at its default.
    let (_system_tx, system_rx) = watch::channel(ColorScheme::default());
    let settings = SettingsStore::load(storage.clone(), system_rx).await;
    let preferences = settings.settings();

    let favorites = FavoritesLedger::new(storage.clone());
    let stored_favorites = favorites.load().await;
    info!(count = stored_favorites.len(), "favorites loaded");

    // 5. Feed
    let client = feed_client(&config)?;
    let fetcher = Arc::new(RetryingFetcher::new(client, config.retry_policy()));
    let gallery = GalleryFeed::new(fetcher, config.feed_options(), preferences.sort_order);

    // 6. Cache housekeeping
    let cache = Arc::new(CacheLedger::new(&storage));
    let shutdown = CancellationToken::new();
    let sweeper = preferences
        .auto_cache
        .then(|| cache.clone().spawn_sweeper(config.sweep_interval(), shutdown.clone()));

    // 7. Session
    gallery.refresh_images().await;
    for _ in 0..config.session.pages {
        let state = gallery.snapshot();
        if state.has_error || state.has_reached_end {
            break;
        }
        gallery.load_more_images().await;
    }

    let state = gallery.snapshot();
    if let Some(message) = &state.error_message {
        if state.is_blocking_error() {
            error!(%message, "no images could be loaded");
        } else {
            warn!(%message, "feed stopped early");
        }
    }

    if preferences.auto_cache {
        for image in &state.images {
            if let Some(size) = image.file_size {
                if let Err(err) = cache.put(&image.id, size, config.cache_ttl()).await {
                    warn!(image_id = %image.id, error = %err, "failed to record cache entry");
                }
            }
        }
    }

    // 8. Report
    let items = gallery.with_favorites(&favorites);
    let favorite_count = items.iter().filter(|item| item.is_favorite).count();
    let viewer = ViewerController::open(state.images.clone(), 0, config.viewer.width);
    let cache_size = cache.total_size().await.unwrap_or_else(|err| {
        warn!(error = %err, "failed to compute cache size");
        0
    });

    info!(
        images = state.images.len(),
        pages = state.current_page,
        reached_end = state.has_reached_end,
        favorites = favorites.count(),
        favorites_on_screen = favorite_count,
        viewer = %viewer.position_label(),
        cache_size = %format_size(cache_size),
        theme = ?settings.effective_theme(),
        "session complete"
    );

    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        sweeper.await.context("cache sweeper panicked")?;
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(feature = "kv-sqlite")]
async fn open_storage(config: &AppConfig) -> anyhow::Result<Storage> {
    let store = SqliteKvStore::new(&config.storage.url)
        .await
        .with_context(|| format!("failed to open {}", config.storage.url))?;
    info!(url = %config.storage.url, "sqlite storage ready");
    Ok(Storage::new(Arc::new(store)))
}

#[cfg(not(feature = "kv-sqlite"))]
async fn open_storage(_config: &AppConfig) -> anyhow::Result<Storage> {
    warn!("kv-sqlite disabled, state will not outlive the process");
    Ok(Storage::in_memory())
}

#[cfg(feature = "feed-http")]
fn feed_client(config: &AppConfig) -> anyhow::Result<Arc<dyn FeedClient>> {
    use secrecy::{ExposeSecret, SecretString};

    let endpoint = FeedEndpoint {
        base_url: config.feed.base_url.clone(),
        event_id: config.feed.event_id.clone(),
        api_key: SecretString::from(config.feed.api_key.expose_secret().to_owned()),
        timeout: config.request_timeout(),
    };
    let client = HttpFeedClient::new(endpoint).context("failed to build feed client")?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "feed-http"))]
fn feed_client(_config: &AppConfig) -> anyhow::Result<Arc<dyn FeedClient>> {
    anyhow::bail!("no feed client compiled in, enable the `feed-http` feature")
}
