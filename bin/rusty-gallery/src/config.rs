//! Typed application configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional
//! `rusty-gallery.toml`, then `GALLERY__`-prefixed environment variables
//! (`GALLERY__FEED__PAGE_SIZE=20` sets `feed.page_size`).

use config::{Config, Environment, File, FileFormat, FileSourceFile};
use rg_core::error::{AppError, Result};
use rg_core::{FeedOptions, RetryPolicy, MAX_PAGE_SIZE};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

pub const CONFIG_FILE: &str = "rusty-gallery";
pub const ENV_PREFIX: &str = "GALLERY";
pub const DEFAULT_FEED_URL: &str = "https://openapi.fotoowl.ai/open/event/image-list";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub retry: RetryConfig,
    pub viewer: ViewerConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub event_id: String,
    pub api_key: SecretString,
    pub page_size: u32,
    pub order_by: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    pub width: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Extra pages pulled after the first refresh
    pub pages: u32,
}

impl AppConfig {
    /// Reads `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_sources(
            Some(File::with_name(CONFIG_FILE).required(false)),
            Environment::with_prefix(ENV_PREFIX),
        )
    }

    fn from_sources(
        file: Option<File<FileSourceFile, FileFormat>>,
        env: Environment,
    ) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("feed.base_url", DEFAULT_FEED_URL)
            .and_then(|b| b.set_default("feed.event_id", ""))
            .and_then(|b| b.set_default("feed.api_key", ""))
            .and_then(|b| b.set_default("feed.page_size", 40))
            .and_then(|b| b.set_default("feed.order_by", 2))
            .and_then(|b| b.set_default("feed.timeout_secs", 30))
            .and_then(|b| b.set_default("retry.attempts", 3))
            .and_then(|b| b.set_default("retry.base_delay_ms", 1000))
            .and_then(|b| b.set_default("viewer.width", 5))
            .and_then(|b| b.set_default("cache.ttl_secs", 30 * 60))
            .and_then(|b| b.set_default("cache.sweep_interval_secs", 60 * 60))
            .and_then(|b| b.set_default("storage.url", "sqlite:rusty_gallery.db"))
            .and_then(|b| b.set_default("log.json", false))
            .and_then(|b| b.set_default("session.pages", 1))
            .map_err(config_error)?;

        if let Some(file) = file {
            builder = builder.add_source(file);
        }

        let config: AppConfig = builder
            .add_source(env.separator("__").try_parsing(true))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(config_error)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.feed_options().validate().map_err(|err| AppError::Config(err.to_string()))?;
        if self.feed.event_id.trim().is_empty() {
            return Err(AppError::Config("feed.event_id must be set".into()));
        }
        if self.viewer.width == 0 {
            return Err(AppError::Config("viewer.width must be at least 1".into()));
        }
        if self.retry.attempts == 0 {
            return Err(AppError::Config("retry.attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            page_size: self.feed.page_size,
            order_by: self.feed.order_by,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout_secs)
    }
}

fn config_error(err: config::ConfigError) -> AppError {
    AppError::Config(err.to_string())
}
