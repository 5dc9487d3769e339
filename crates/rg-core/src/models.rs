//! # Domain Models
//!
//! These structs represent the core entities of Rusty-Gallery.
//! Images are immutable once normalized; list operations always build new
//! sequences instead of editing entries in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height used when the feed omits an image's dimensions.
pub const FALLBACK_DIMENSION: u32 = 1080;

/// A single photo of the feed, normalized from the remote listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Unique within a feed
    pub id: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    /// Size of the original in bytes, when the feed reports it
    pub file_size: Option<u64>,
}

impl Image {
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    /// Thumbnail when available, full image otherwise.
    pub fn preview_url(&self) -> &str {
        self.thumbnail_url.as_deref().unwrap_or(&self.url)
    }
}

/// Image identifiers arrive as either JSON strings or numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(u64),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Text(s) => f.write_str(s),
            RawId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One entry of the remote image list, exactly as the endpoint sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawImage {
    pub id: RawId,
    pub img_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl RawImage {
    /// Converts the wire entry into an [`Image`].
    ///
    /// Missing (or zero) dimensions fall back to a square of
    /// [`FALLBACK_DIMENSION`]; a missing timestamp becomes `fetched_at`.
    pub fn normalize(self, fetched_at: DateTime<Utc>) -> Image {
        let dimension = |value: Option<u32>| value.filter(|v| *v > 0).unwrap_or(FALLBACK_DIMENSION);
        Image {
            id: self.id.to_string(),
            url: self.img_url,
            thumbnail_url: self.thumbnail_url,
            width: dimension(self.width),
            height: dimension(self.height),
            created_at: self.created_at.unwrap_or(fetched_at),
            file_size: self.size,
        }
    }
}

/// Result of a single round trip to the feed endpoint, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeedResponse {
    pub items: Vec<RawImage>,
    /// Server-declared size of the whole feed, if sent
    pub total_count: Option<u64>,
}

/// Parameters of one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub page_size: u32,
    /// Integer ordering key understood by the endpoint
    pub order_by: u32,
    pub order_ascending: bool,
}

/// A normalized page of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub images: Vec<Image>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub has_more: bool,
}

impl FeedPage {
    /// Builds a page from a raw response. A short page ends the feed
    /// regardless of what the server claims as total; a missing or zero
    /// total falls back to the item count.
    pub fn from_raw(query: &PageQuery, raw: RawFeedResponse, fetched_at: DateTime<Utc>) -> Self {
        let images: Vec<Image> = raw
            .items
            .into_iter()
            .map(|item| item.normalize(fetched_at))
            .collect();
        let total_count = raw
            .total_count
            .filter(|total| *total > 0)
            .unwrap_or(images.len() as u64);
        let full_page = images.len() >= query.page_size as usize;
        let within_total = (u64::from(query.page) + 1) * u64::from(query.page_size) < total_count;

        Self {
            images,
            page: query.page,
            page_size: query.page_size,
            total_count,
            has_more: full_page && within_total,
        }
    }

    pub fn is_short(&self) -> bool {
        self.images.len() < self.page_size as usize
    }
}

/// How the feed is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    DateAsc,
    #[default]
    DateDesc,
    SizeAsc,
    SizeDesc,
}

impl SortOrder {
    pub fn is_ascending(self) -> bool {
        matches!(self, SortOrder::DateAsc | SortOrder::SizeAsc)
    }
}

/// Persisted copy of a favorited image. Holds everything a favorites grid
/// needs so it can render without a network round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub id: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    pub file_size: Option<u64>,
}

impl From<&Image> for FavoriteEntry {
    fn from(image: &Image) -> Self {
        Self {
            id: image.id.clone(),
            url: image.url.clone(),
            thumbnail_url: image.thumbnail_url.clone(),
            width: image.width,
            height: image.height,
            created_at: image.created_at,
            file_size: image.file_size,
        }
    }
}

impl From<FavoriteEntry> for Image {
    fn from(entry: FavoriteEntry) -> Self {
        Self {
            id: entry.id,
            url: entry.url,
            thumbnail_url: entry.thumbnail_url,
            width: entry.width,
            height: entry.height,
            created_at: entry.created_at,
            file_size: entry.file_size,
        }
    }
}

/// Per-image cache bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadataEntry {
    /// When the payload was cached
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Cached bytes
    pub size: u64,
}

impl CacheMetadataEntry {
    /// An entry is expired once `expires_at <= now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// An image together with its favorite overlay, as handed to a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryItem {
    pub image: Image,
    pub is_favorite: bool,
}
