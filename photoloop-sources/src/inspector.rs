use std::collections::HashSet;

use chrono::NaiveDateTime;
use photoloop_state::MediaKind;

/// Phases reported by the album inspector while it works through a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectStage {
    /// Opening the album page.
    Loading,
    /// Scrolling to force more items into the DOM.
    Scrolling,
    /// Enumeration finished.
    Complete,
}

/// A hard failure inside the album inspector. The adapter fails the entire
/// source with this rather than returning a partially-empty inventory.
#[derive(Debug)]
pub struct InspectorError {
    pub message: String,
}

impl InspectorError {
    pub fn new(message: impl Into<String>) -> Self {
        InspectorError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for InspectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for InspectorError {}

/// One media item found during bulk album enumeration.
#[derive(Debug, Clone)]
pub struct RemoteItem {
    /// Canonical base URI, without size parameters.
    pub uri: String,
    pub kind: MediaKind,
    /// Caption text, if the album view already exposed one.
    pub caption: Option<String>,
}

/// Late-bound metadata for one item, obtained from its detail view. The
/// inspector is responsible for having already classified the scraped text
/// into these fields.
#[derive(Debug, Clone)]
pub struct RemoteItemMetadata {
    pub uri: String,
    pub caption: Option<String>,
    pub location: Option<String>,
    pub date: Option<NaiveDateTime>,
}

/// Contract for the external web-album inspector (the component that drives a
/// real browser and walks the album DOM, which lives outside this codebase).
pub trait RemoteAlbumInspector: Send + Sync {
    /// Enumerate every media item visible in the album at `album_url`.
    ///
    /// `progress` is called with `(stage, current, total)` as items are
    /// discovered; `total` may be 0 while unknown.
    fn inventory(
        &self,
        album_url: &str,
        progress: &mut dyn FnMut(InspectStage, usize, usize),
    ) -> Result<Vec<RemoteItem>, InspectorError>;

    /// Open the detail view of each URI in `uris` and stream back whatever
    /// caption/location/date text the page exposes. Implementations MUST call
    /// `on_item` exactly once per requested URI, including when nothing was
    /// found, so the caller can record that the attempt happened.
    fn fetch_metadata(
        &self,
        album_url: &str,
        uris: &HashSet<String>,
        progress: &mut dyn FnMut(usize, usize),
        on_item: &mut dyn FnMut(RemoteItemMetadata),
    ) -> Result<(), InspectorError>;
}

/// Stand-in wired up when no browser-backed inspector is installed. Every
/// call fails, which surfaces as a per-source sync error without aborting the
/// rest of the cycle.
pub struct UnavailableInspector;

impl RemoteAlbumInspector for UnavailableInspector {
    fn inventory(
        &self,
        album_url: &str,
        _progress: &mut dyn FnMut(InspectStage, usize, usize),
    ) -> Result<Vec<RemoteItem>, InspectorError> {
        Err(InspectorError::new(format!(
            "no album inspector available to enumerate {album_url}"
        )))
    }

    fn fetch_metadata(
        &self,
        album_url: &str,
        _uris: &HashSet<String>,
        _progress: &mut dyn FnMut(usize, usize),
        _on_item: &mut dyn FnMut(RemoteItemMetadata),
    ) -> Result<(), InspectorError> {
        Err(InspectorError::new(format!(
            "no album inspector available to fetch metadata from {album_url}"
        )))
    }
}
