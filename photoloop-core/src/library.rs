use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use chrono::Local;

use photoloop_shared::Config;
use photoloop_sources::{MediaFetcher, RemoteAlbumInspector};
use photoloop_state::{
    Catalog, DisplayParams, MediaCounts, MediaEntry, MediaId, MediaKind,
};

use crate::{
    collaborators::{
        AestheticCropper, FaceDetector, MetadataExtractor, ReverseGeocoder, SaliencyDetector,
    },
    geocode::GeocodeService,
    playlist::{Playlist, RecencyPolicy},
    processor::ImageProcessor,
    progress::SyncProgress,
};

/// Everything guarded by the library lock: the catalog, the playlist built
/// from it, the observable sync progress, and the set of entries with a
/// geocode task in flight. Keeping them under one lock gives playlist
/// rebuilds a consistent snapshot of the catalog.
pub(crate) struct LibraryState {
    pub(crate) catalog: Catalog,
    pub(crate) playlist: Playlist,
    pub(crate) progress: SyncProgress,
    pub(crate) geocode_in_flight: HashSet<MediaId>,
}

/// Construction arguments for [`MediaLibrary`].
pub struct LibraryArgs {
    pub config: Arc<RwLock<Config>>,
    pub inspector: Arc<dyn RemoteAlbumInspector>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub metadata: Arc<dyn MetadataExtractor>,
    pub face_detector: Option<Arc<dyn FaceDetector>>,
    pub saliency: Option<Arc<dyn SaliencyDetector>>,
    pub aesthetic: Option<Arc<dyn AestheticCropper>>,
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
}

/// The media library: durable catalog, current playlist, and the operations
/// every thread goes through to read or mutate them. Shared across the
/// display thread, the sync thread, annotator tasks, and the control surface.
pub struct MediaLibrary {
    pub(crate) config: Arc<RwLock<Config>>,
    pub(crate) cache_dir: PathBuf,
    pub(crate) state: Mutex<LibraryState>,
    /// Guards whole sync cycles. `try_lock` only; a second sync request while
    /// one is running is dropped, not queued.
    pub(crate) sync_lock: Mutex<()>,
    pub(crate) inspector: Arc<dyn RemoteAlbumInspector>,
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    pub(crate) metadata: Arc<dyn MetadataExtractor>,
    pub(crate) face_detector: Option<Arc<dyn FaceDetector>>,
    pub(crate) saliency: Option<Arc<dyn SaliencyDetector>>,
    pub(crate) aesthetic: Option<Arc<dyn AestheticCropper>>,
    pub(crate) geocode: Option<Arc<GeocodeService>>,
}

impl MediaLibrary {
    pub fn new(args: LibraryArgs) -> Self {
        let (cache_dir, fingerprint) = {
            let config = args.config.read().unwrap();
            (config.cache.directory_path(), config.fingerprint())
        };
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::error!("failed to create cache directory {}: {e}", cache_dir.display());
        }

        let catalog = Catalog::load(&cache_dir, fingerprint);
        let geocode = args
            .geocoder
            .map(|geocoder| Arc::new(GeocodeService::new(&cache_dir, geocoder)));

        let library = MediaLibrary {
            config: args.config,
            cache_dir,
            state: Mutex::new(LibraryState {
                catalog,
                playlist: Playlist::default(),
                progress: SyncProgress::default(),
                geocode_in_flight: HashSet::new(),
            }),
            sync_lock: Mutex::new(()),
            inspector: args.inspector,
            fetcher: args.fetcher,
            metadata: args.metadata,
            face_detector: args.face_detector,
            saliency: args.saliency,
            aesthetic: args.aesthetic,
            geocode,
        };

        {
            let mut state = library.lock_state();
            library.rebuild_playlist_locked(&mut state);
        }
        library
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, LibraryState> {
        self.state.lock().unwrap()
    }

    /// Handle to the live configuration shared with the control surface.
    pub fn config(&self) -> Arc<RwLock<Config>> {
        self.config.clone()
    }

    pub fn has_enabled_sources(&self) -> bool {
        self.config.read().unwrap().has_enabled_sources()
    }

    /// Next item to display, advancing the cursor. Rebuilds the playlist
    /// first if it is empty (e.g. after a config change).
    pub fn next_media(&self) -> Option<MediaEntry> {
        let mut state = self.lock_state();
        if state.playlist.is_empty() {
            self.rebuild_playlist_locked(&mut state);
        }
        let id = state.playlist.next(&mut rand::rng())?;
        state.catalog.get(&id).cloned()
    }

    /// Previous item, stepping the cursor back one shown item.
    pub fn previous_media(&self) -> Option<MediaEntry> {
        let mut state = self.lock_state();
        if state.playlist.is_empty() {
            self.rebuild_playlist_locked(&mut state);
        }
        let id = state.playlist.previous()?;
        state.catalog.get(&id).cloned()
    }

    /// Rebuild the playlist from the current catalog and configuration.
    pub fn rebuild_playlist(&self) {
        let mut state = self.lock_state();
        self.rebuild_playlist_locked(&mut state);
    }

    /// Displayable means: not tombstoned, bytes still on disk, from an
    /// enabled source, and videos only when enabled.
    pub(crate) fn rebuild_playlist_locked(&self, state: &mut LibraryState) {
        let (order, recency, video_enabled, enabled_labels) = {
            let config = self.config.read().unwrap();
            (
                config.display.order,
                RecencyPolicy {
                    cutoff_years: config.display.recency_cutoff_years,
                    min_weight: config.display.recency_min_weight,
                },
                config.display.video_enabled,
                config
                    .enabled_source_labels()
                    .into_iter()
                    .collect::<HashSet<_>>(),
            )
        };

        let entries: Vec<&MediaEntry> = state
            .catalog
            .all_active()
            .filter(|e| enabled_labels.contains(&e.album_source))
            .filter(|e| e.media_kind == MediaKind::Photo || video_enabled)
            .filter(|e| e.local_path.exists())
            .collect();

        state.playlist = Playlist::build(
            &entries,
            order,
            recency,
            Local::now().naive_local(),
            &mut rand::rng(),
        );
        tracing::debug!("playlist rebuilt with {} items", state.playlist.len());
    }

    /// Display parameters for an entry at `resolution`, memoized on the
    /// catalog entry. Reused iff the stored resolution matches; the settings
    /// fingerprint side of validity is enforced at catalog load.
    pub fn display_params(&self, id: &MediaId, resolution: (u32, u32)) -> Option<DisplayParams> {
        let (path, kind, cached_faces) = {
            let state = self.lock_state();
            let entry = state.catalog.get(id)?;
            if let Some(params) = &entry.display_params
                && params.screen_resolution == resolution
            {
                return Some(params.clone());
            }
            (
                entry.local_path.clone(),
                entry.media_kind,
                entry.cached_faces.clone(),
            )
        };

        // Collaborator calls happen outside the lock.
        let faces = if kind == MediaKind::Photo {
            self.ensure_faces(id, &path, cached_faces)
        } else {
            Vec::new()
        };

        let (scaling, ken_burns, photo_duration) = {
            let config = self.config.read().unwrap();
            (
                config.scaling.clone(),
                config.ken_burns.clone(),
                config.display.photo_duration_seconds as f32,
            )
        };
        let processor = ImageProcessor::new(
            resolution,
            scaling,
            ken_burns,
            photo_duration,
            self.saliency.clone(),
            self.aesthetic.clone(),
        );
        let params = processor.compute_display_params(&path, &faces, &mut rand::rng());

        let mut state = self.lock_state();
        if let Some(entry) = state.catalog.get_mut(id) {
            entry.display_params = Some(params.clone());
            self.save_catalog_locked(&state);
        }
        Some(params)
    }

    pub fn media_counts(&self) -> MediaCounts {
        self.lock_state().catalog.count_by_kind()
    }

    pub fn cache_size_bytes(&self) -> u64 {
        self.lock_state().catalog.total_bytes_on_disk()
    }

    /// Snapshot of all active entries, for the control surface.
    pub fn all_media(&self) -> Vec<MediaEntry> {
        self.lock_state().catalog.all_active().cloned().collect()
    }

    pub fn get_entry(&self, id: &MediaId) -> Option<MediaEntry> {
        self.lock_state().catalog.get(id).cloned()
    }

    pub fn sync_progress(&self) -> SyncProgress {
        self.lock_state().progress.clone()
    }

    pub fn source_sync_times(&self) -> std::collections::HashMap<String, chrono::DateTime<Local>> {
        self.lock_state().catalog.source_sync_times().clone()
    }

    /// Store a reverse-geocoded location on an entry and persist.
    pub fn set_location(&self, id: &MediaId, location: Option<String>) {
        let mut state = self.lock_state();
        if state.catalog.set_location(id, location) {
            self.save_catalog_locked(&state);
        }
    }

    /// Destroy every entry and its cached bytes.
    pub fn clear_cache(&self) {
        let mut state = self.lock_state();
        state.catalog.clear_all();
        state.playlist = Playlist::default();
        self.save_catalog_locked(&state);
        tracing::info!("cache cleared");
    }

    pub fn geocode_service(&self) -> Option<Arc<GeocodeService>> {
        self.geocode.clone()
    }

    /// Persist the geocode cache; called on orderly shutdown.
    pub fn save_geocode_cache(&self) {
        if let Some(geocode) = &self.geocode {
            geocode.save();
        }
    }

    pub(crate) fn save_catalog_locked(&self, state: &LibraryState) {
        if let Err(e) = state.catalog.save() {
            tracing::error!("failed to save catalog: {e}");
        }
    }
}
