//! # Windowed Viewer
//!
//! Full-screen viewing over an arbitrarily long image sequence while only a
//! bounded window of `width` images is handed to the pager.
//!
//! # Developer Note
//! Navigation is two-step: move the active index, recompute the window,
//! then locate the active index inside the *new* window. The window slides
//! as the index nears its edges, so the old page position is meaningless.
//! The seek target is released only when the presentation layer
//! acknowledges that it rendered the matching window revision.

use crate::error::{AppError, Result};
use crate::models::Image;

/// Number of images kept resident in the viewer.
pub const DEFAULT_WINDOW_WIDTH: usize = 5;

/// An image of the window, tagged with its index in the full sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedImage {
    pub image: Image,
    pub original_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerWindow {
    pub entries: Vec<WindowedImage>,
    /// Position of the active image inside `entries`
    pub active: usize,
}

impl ViewerWindow {
    /// Index in the full sequence of the first windowed image.
    pub fn start(&self) -> usize {
        self.entries.first().map_or(0, |entry| entry.original_index)
    }

    pub fn original_indices(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.original_index).collect()
    }

    /// Position inside the window of the image at `original_index`.
    pub fn position_of(&self, original_index: usize) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.original_index == original_index)
    }
}

/// Computes the window of at most `width` images around `active_index`.
///
/// The window is centered on the active image and shifted inward at either
/// end of the sequence, so it stays `width` wide whenever the sequence is.
/// Fails with `NotFound` when `active_index` is not in `images` (including
/// when `images` is empty).
pub fn window(images: &[Image], active_index: usize, width: usize) -> Result<ViewerWindow> {
    if active_index >= images.len() {
        return Err(AppError::NotFound("image".to_string(), active_index.to_string()));
    }

    let width = width.max(1);
    let start = active_index
        .saturating_sub(width / 2)
        .min(images.len().saturating_sub(width));
    let end = (start + width).min(images.len());

    let entries = images[start..end]
        .iter()
        .enumerate()
        .map(|(offset, image)| WindowedImage {
            image: image.clone(),
            original_index: start + offset,
        })
        .collect();

    Ok(ViewerWindow {
        entries,
        active: active_index - start,
    })
}

/// A recomputed window the pager should render, and the revision to
/// acknowledge once it has.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowUpdate {
    pub window: ViewerWindow,
    pub revision: u64,
}

pub struct ViewerController {
    images: Vec<Image>,
    active_index: usize,
    width: usize,
    current: Option<ViewerWindow>,
    revision: u64,
    /// Revision and windowed page waiting for the pager's acknowledgment
    pending_seek: Option<(u64, usize)>,
}

impl ViewerController {
    /// Opens the viewer on `initial_index`, clamped into the sequence.
    pub fn open(images: Vec<Image>, initial_index: usize, width: usize) -> Self {
        let active_index = initial_index.min(images.len().saturating_sub(1));
        let mut controller = Self {
            images,
            active_index,
            width: width.max(1),
            current: None,
            revision: 0,
            pending_seek: None,
        };
        controller.recompute();
        controller
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn current(&self) -> Option<&Image> {
        self.images.get(self.active_index)
    }

    /// The window to render; `None` means the placeholder state.
    pub fn window(&self) -> Option<&ViewerWindow> {
        self.current.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// "3 / 12" style counter for the active image.
    pub fn position_label(&self) -> String {
        if self.images.is_empty() {
            return "0 / 0".to_string();
        }
        format!("{} / {}", self.active_index + 1, self.images.len())
    }

    pub fn go_to_next(&mut self) -> Option<WindowUpdate> {
        if self.images.is_empty() || self.active_index + 1 >= self.images.len() {
            return None;
        }
        self.move_to(self.active_index + 1)
    }

    pub fn go_to_previous(&mut self) -> Option<WindowUpdate> {
        if self.images.is_empty() || self.active_index == 0 {
            return None;
        }
        self.move_to(self.active_index - 1)
    }

    /// Makes `index` active. No-op when it is out of range or already active.
    pub fn jump_to(&mut self, index: usize) -> Option<WindowUpdate> {
        if index >= self.images.len() || index == self.active_index {
            return None;
        }
        self.move_to(index)
    }

    /// The user swiped the pager to `windowed_position` of the current window.
    pub fn page_selected(&mut self, windowed_position: usize) -> Option<WindowUpdate> {
        let original = self
            .current
            .as_ref()?
            .entries
            .get(windowed_position)?
            .original_index;
        self.jump_to(original)
    }

    /// Swaps the backing sequence, keeping the active index when possible.
    pub fn replace_images(&mut self, images: Vec<Image>) -> Option<WindowUpdate> {
        self.images = images;
        self.active_index = self.active_index.min(self.images.len().saturating_sub(1));
        self.recompute()
    }

    /// Called by the pager once it rendered the window of `revision`.
    /// Returns the page to seek to, or `None` for a stale revision.
    pub fn acknowledge(&mut self, revision: u64) -> Option<usize> {
        match self.pending_seek {
            Some((pending, page)) if pending == revision => {
                self.pending_seek = None;
                Some(page)
            }
            _ => None,
        }
    }

    fn move_to(&mut self, index: usize) -> Option<WindowUpdate> {
        self.active_index = index;
        self.recompute()
    }

    fn recompute(&mut self) -> Option<WindowUpdate> {
        let Ok(next) = window(&self.images, self.active_index, self.width) else {
            self.current = None;
            self.pending_seek = None;
            return None;
        };
        let seek = next.position_of(self.active_index)?;

        self.revision += 1;
        self.pending_seek = Some((self.revision, seek));
        self.current = Some(next.clone());
        Some(WindowUpdate {
            window: next,
            revision: self.revision,
        })
    }
}
