//! # Gallery Feed
//!
//! The paginated feed state machine: first load, tail pagination, pull to
//! refresh, sort changes and error recovery on top of a [`RetryingFetcher`].
//!
//! State lives in a `watch` channel. The presentation layer subscribes for
//! snapshots and drives the feed through the action methods; it never gets a
//! mutable handle.
//!
//! # Developer Note
//! Every load takes a ticket (a generation number). A completion only lands
//! if its ticket is still the active one, so a superseded page load or a
//! load that outlived [`GalleryFeed::reset_gallery`] cannot touch the state.

use crate::error::{AppError, Result};
use crate::favorites::FavoritesLedger;
use crate::fetch::RetryingFetcher;
use crate::models::{FeedPage, GalleryItem, Image, PageQuery, SortOrder};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Largest page the endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Paging parameters fixed for the lifetime of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    pub page_size: u32,
    /// Integer ordering key sent with every request
    pub order_by: u32,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            page_size: 40,
            order_by: 2,
        }
    }
}

impl FeedOptions {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryFeedState {
    pub images: Vec<Image>,
    /// Next page index to request
    pub current_page: u32,
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub has_reached_end: bool,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub sort_order: SortOrder,
}

impl GalleryFeedState {
    fn initial(sort_order: SortOrder) -> Self {
        Self {
            images: Vec::new(),
            current_page: 0,
            is_loading: false,
            is_refreshing: false,
            has_reached_end: false,
            has_error: false,
            error_message: None,
            sort_order,
        }
    }

    pub fn phase(&self) -> FeedPhase {
        if self.is_refreshing {
            FeedPhase::Refreshing
        } else if self.is_loading && self.images.is_empty() {
            FeedPhase::LoadingInitial
        } else if self.is_loading {
            FeedPhase::LoadingMore
        } else if self.has_error {
            FeedPhase::Error
        } else {
            FeedPhase::Idle
        }
    }

    /// True when an error left nothing to show, so the whole grid is
    /// replaced by an error screen instead of an inline retry row.
    pub fn is_blocking_error(&self) -> bool {
        self.has_error && self.images.is_empty()
    }
}

/// Coarse state derived from the feed flags. `has_reached_end` is orthogonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Idle,
    LoadingInitial,
    LoadingMore,
    Refreshing,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    /// Next page, appended
    Next,
    /// Page 0, replacing everything
    Refresh,
    /// Page 0 after a sort change; supersedes even a running refresh
    Reorder,
}

impl LoadKind {
    fn restarts(self) -> bool {
        !matches!(self, LoadKind::Next)
    }
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    generation: u64,
    kind: LoadKind,
}

#[derive(Debug, Default)]
struct LoadSlot {
    generation: u64,
    active: Option<Ticket>,
}

pub struct GalleryFeed {
    fetcher: Arc<RetryingFetcher>,
    options: FeedOptions,
    initial_sort: SortOrder,
    state: watch::Sender<GalleryFeedState>,
    loads: Mutex<LoadSlot>,
}

impl GalleryFeed {
    pub fn new(fetcher: Arc<RetryingFetcher>, options: FeedOptions, sort_order: SortOrder) -> Self {
        let (state, _) = watch::channel(GalleryFeedState::initial(sort_order));
        Self {
            fetcher,
            options,
            initial_sort: sort_order,
            state,
            loads: Mutex::new(LoadSlot::default()),
        }
    }

    pub fn options(&self) -> FeedOptions {
        self.options
    }

    pub fn snapshot(&self) -> GalleryFeedState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<GalleryFeedState> {
        self.state.subscribe()
    }

    /// Current images paired with their favorite flags.
    pub fn with_favorites(&self, favorites: &FavoritesLedger) -> Vec<GalleryItem> {
        favorites.overlay(&self.state.borrow().images)
    }

    /// Loads page 0 (replacing) when `refresh`, the next page (appending)
    /// otherwise. No-op while another load is in flight, except that a
    /// refresh supersedes a running tail load.
    pub async fn load_images(&self, refresh: bool) {
        let kind = if refresh { LoadKind::Refresh } else { LoadKind::Next };
        self.run_load(kind).await;
    }

    /// Requests the next page unless loading, at the end, or in error.
    pub async fn load_more_images(&self) {
        {
            let state = self.state.borrow();
            if state.is_loading || state.has_reached_end || state.has_error {
                return;
            }
        }
        self.run_load(LoadKind::Next).await;
    }

    pub async fn refresh_images(&self) {
        self.refresh_with(LoadKind::Refresh).await;
    }

    /// Switches the ordering and restarts the feed from page 0.
    pub async fn set_sort_order(&self, order: SortOrder) {
        self.state.send_if_modified(|state| {
            let changed = state.sort_order != order;
            state.sort_order = order;
            changed
        });
        info!(?order, "sort order changed");
        self.refresh_with(LoadKind::Reorder).await;
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| {
            let had_error = state.has_error;
            state.has_error = false;
            state.error_message = None;
            had_error
        });
    }

    /// Clears the error and repeats the failed request: page 0 when nothing
    /// is loaded yet, the next page otherwise.
    pub async fn retry(&self) {
        self.clear_error();
        let first_page = self.state.borrow().images.is_empty();
        self.load_images(first_page).await;
    }

    /// Cancels the load in flight and restores the initial empty state.
    pub fn reset_gallery(&self) {
        let mut loads = self.lock_loads();
        loads.active = None;
        self.fetcher.cancel();
        self.state.send_replace(GalleryFeedState::initial(self.initial_sort));
        debug!("gallery reset");
    }

    async fn refresh_with(&self, kind: LoadKind) {
        self.state.send_if_modified(|state| {
            let was_refreshing = state.is_refreshing;
            state.is_refreshing = true;
            !was_refreshing
        });
        self.run_load(kind).await;

        // A newer refresh may still be running; leave its flag alone.
        let loads = self.lock_loads();
        if !matches!(loads.active, Some(ticket) if ticket.kind.restarts()) {
            self.state.send_if_modified(|state| {
                let was_refreshing = state.is_refreshing;
                state.is_refreshing = false;
                was_refreshing
            });
        }
    }

    async fn run_load(&self, kind: LoadKind) {
        let Some((ticket, query)) = self.begin_load(kind) else {
            return;
        };
        let outcome = self.fetcher.fetch_page(query).await;
        self.finish_load(ticket, outcome);
    }

    fn begin_load(&self, kind: LoadKind) -> Option<(Ticket, PageQuery)> {
        let mut loads = self.lock_loads();
        if let Some(active) = loads.active {
            let supersedes = match kind {
                LoadKind::Next => false,
                LoadKind::Refresh => active.kind == LoadKind::Next,
                LoadKind::Reorder => true,
            };
            if !supersedes {
                debug!(?kind, "load already in flight, ignoring");
                return None;
            }
            debug!(?kind, superseded = ?active.kind, "superseding in-flight load");
        }

        loads.generation += 1;
        let ticket = Ticket {
            generation: loads.generation,
            kind,
        };
        loads.active = Some(ticket);

        let mut query = None;
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.has_error = false;
            state.error_message = None;
            query = Some(PageQuery {
                page: if kind.restarts() { 0 } else { state.current_page },
                page_size: self.options.page_size,
                order_by: self.options.order_by,
                order_ascending: state.sort_order.is_ascending(),
            });
        });
        query.map(|query| (ticket, query))
    }

    fn finish_load(&self, ticket: Ticket, outcome: Result<Option<FeedPage>>) {
        let mut loads = self.lock_loads();
        if !matches!(loads.active, Some(active) if active.generation == ticket.generation) {
            debug!(generation = ticket.generation, "discarding stale load result");
            return;
        }
        loads.active = None;

        match outcome {
            Ok(Some(page)) => {
                let short = page.is_short();
                let received = page.images.len();
                self.state.send_modify(|state| {
                    if ticket.kind.restarts() {
                        state.images = page.images;
                        state.current_page = 1;
                        state.has_reached_end = short;
                    } else {
                        state.images.extend(page.images);
                        state.current_page += 1;
                        // Only a restart reopens an ended feed.
                        state.has_reached_end |= short;
                    }
                    state.is_loading = false;
                });
                debug!(page = page.page, received, short, "page applied");
            }
            Ok(None) => {
                self.state.send_modify(|state| state.is_loading = false);
            }
            Err(err) => {
                warn!(error = %err, kind = ?ticket.kind, "feed load failed");
                let message = err.user_message();
                self.state.send_modify(|state| {
                    state.is_loading = false;
                    state.has_error = true;
                    state.error_message = Some(message);
                });
            }
        }
    }

    fn lock_loads(&self) -> MutexGuard<'_, LoadSlot> {
        self.loads.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
