//! rusty-gallery/crates/rg-core/src/lib.rs
//!
//! The central domain logic and port definitions for Rusty-Gallery:
//! the retrying feed fetcher, the gallery feed state machine, the windowed
//! viewer, and the favorites/cache/settings ledgers over a key-value store.

pub mod cache;
pub mod error;
pub mod favorites;
pub mod fetch;
pub mod gallery;
pub mod models;
pub mod settings;
pub mod storage;
pub mod traits;
pub mod viewer;

// Re-exporting for easier access in other crates
pub use cache::{format_size, CacheLedger};
pub use error::*;
pub use favorites::FavoritesLedger;
pub use fetch::{RetryPolicy, RetryingFetcher};
pub use gallery::{FeedOptions, FeedPhase, GalleryFeed, GalleryFeedState, MAX_PAGE_SIZE};
pub use models::*;
pub use settings::{ColorScheme, GallerySettings, SettingsStore, ThemePreference};
pub use storage::{keys, MemoryStore, ScopedStorage, Storage};
pub use traits::*;
pub use viewer::{window, ViewerController, ViewerWindow, WindowUpdate, WindowedImage};
