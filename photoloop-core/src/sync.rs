//! The sync coordinator: one full reconciliation cycle across all enabled
//! sources, built to stay safe under partial failure. A source that errors
//! costs one stat counter, never the catalog; mass-tombstoning is gated on
//! the cycle having returned a plausible number of items.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::Serialize;

use photoloop_shared::SourceConfig;
use photoloop_sources::{
    cache_file_name, content_hash, download_url, path_from_file_uri, scan_directory,
    InventoryItem, SourceError, SourceResult,
};
use photoloop_state::{MediaEntry, MediaId, MediaKind, SourceType};

use crate::{
    library::MediaLibrary,
    progress::{SyncProgress, SyncStage},
};

/// Caller-selectable sync behavior.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Re-acquire every item, not just new ones.
    pub force_full: bool,
    /// Fetch remote metadata for every remote photo that has never had a
    /// successful (or failed) fetch attempt.
    pub update_all_missing_metadata: bool,
    /// Clear every remote photo's fetched flag and fetch metadata again; for
    /// use after the inspector's extraction logic changes.
    pub force_refetch_all_metadata: bool,
}

/// Counters for one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub metadata_updated: usize,
}

impl MediaLibrary {
    /// Run a full sync cycle. Concurrent requests are dropped, not queued: if
    /// a cycle is already running this returns immediately with empty stats.
    pub fn sync(&self, options: &SyncOptions) -> SyncStats {
        match self.sync_lock.try_lock() {
            Ok(_guard) => self.run_sync(options),
            Err(_) => {
                tracing::warn!("sync already in progress, skipping");
                SyncStats::default()
            }
        }
    }

    fn run_sync(&self, options: &SyncOptions) -> SyncStats {
        let mut stats = SyncStats::default();
        let now = Local::now();
        tracing::info!("starting sync cycle");

        let (all_sources, full_resolution, max_dimension) = {
            let config = self.config.read().unwrap();
            (
                config.sources.clone(),
                config.sync.full_resolution,
                config.sync.max_dimension,
            )
        };
        let enabled: Vec<SourceConfig> = all_sources
            .iter()
            .filter(|s| s.enabled && s.is_usable())
            .cloned()
            .collect();
        let enabled_labels: HashSet<String> = all_sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.label())
            .collect();

        // Captured before the cycle mutates anything; the deletion safety
        // floor is half of this.
        let prior_active = {
            let mut state = self.lock_state();
            state.progress = SyncProgress::starting(enabled.len());
            state
                .catalog
                .all_active()
                .filter(|e| enabled_labels.contains(&e.album_source))
                .count()
        };

        // Enumerate every enabled source. A failing source is recorded and
        // skipped; the cycle continues with whatever the others returned.
        let mut all_items: Vec<InventoryItem> = Vec::new();
        let mut synced_labels: HashSet<String> = HashSet::new();
        for source in &enabled {
            let label = source.label();
            {
                let mut state = self.lock_state();
                state.progress.source_name = label.clone();
            }
            let result = match source.kind {
                SourceType::RemoteAlbum => self.enumerate_remote(source),
                SourceType::Local => Ok(scan_directory(&source.directory(), &label)),
            };
            match result {
                Ok(items) => {
                    tracing::info!("source {label}: {} items", items.len());
                    all_items.extend(items);
                    synced_labels.insert(label.clone());
                    let mut state = self.lock_state();
                    state.catalog.record_source_sync(&label, now);
                    state.progress.sources_done += 1;
                    state.progress.items_found = all_items.len();
                }
                Err(e) => {
                    tracing::error!("failed to process source {label}: {e}");
                    stats.errors += 1;
                    let mut state = self.lock_state();
                    state.progress.error_message = e.to_string();
                }
            }
        }
        tracing::info!(
            "found {} items ({}/{} sources reported)",
            all_items.len(),
            synced_labels.len(),
            enabled.len()
        );

        // Acquire new items, refresh re-observed ones.
        let observed: HashSet<String> = all_items.iter().map(|i| i.uri.clone()).collect();
        {
            let mut state = self.lock_state();
            let acquired_total = all_items
                .iter()
                .filter(|i| {
                    options.force_full || !state.catalog.contains(&MediaId::from_uri(&i.uri))
                })
                .count();
            state.progress.stage = SyncStage::Downloading;
            state.progress.acquired_total = acquired_total;
            state.progress.acquired_done = 0;
        }

        let mut new_remote_photos: HashSet<String> = HashSet::new();
        for item in &all_items {
            let id = MediaId::from_uri(&item.uri);
            let existing = self.lock_state().catalog.get(&id).cloned();
            if let Some(existing) = existing
                && !options.force_full
            {
                self.refresh_existing(item, &existing, now, &mut stats);
                continue;
            }

            match self.acquire_item(item, &id, now, full_resolution, max_dimension) {
                Ok(entry) => {
                    if entry.media_kind == MediaKind::Photo
                        && entry.source_type == SourceType::RemoteAlbum
                    {
                        new_remote_photos.insert(item.uri.clone());
                    }
                    let mut state = self.lock_state();
                    state.catalog.put(entry);
                    state.progress.acquired_done += 1;
                    stats.new += 1;
                }
                Err(e) => {
                    tracing::error!("failed to acquire {}: {e}", item.uri);
                    stats.errors += 1;
                    let mut state = self.lock_state();
                    state.progress.acquired_done += 1;
                }
            }
        }
        {
            let state = self.lock_state();
            self.save_catalog_locked(&state);
        }

        // Remote caption/location/date follow-up.
        if !synced_labels.is_empty() {
            self.remote_metadata_follow_up(options, &enabled, &new_remote_photos, &mut stats);
        }

        // Tombstoning, behind the safety gate: a sync that failed outright or
        // returned implausibly few items must never wipe the catalog.
        {
            let mut state = self.lock_state();
            let safety_floor = std::cmp::max(1, prior_active / 2);
            if synced_labels.is_empty() {
                if !enabled.is_empty() {
                    tracing::warn!(
                        "skipping deletion check: all {} source(s) failed; \
                         existing entries are preserved",
                        enabled.len()
                    );
                }
            } else if all_items.len() < safety_floor && prior_active > 0 {
                tracing::warn!(
                    "skipping deletion check: found {} items but expected at least \
                     {safety_floor} (half of {prior_active} active); sync may have \
                     failed, preserving cache",
                    all_items.len()
                );
            } else {
                for entry in state.catalog.entries_mut() {
                    if !entry.deleted
                        && synced_labels.contains(&entry.album_source)
                        && !observed.contains(&entry.uri)
                    {
                        tracing::debug!("tombstoning {}", entry.uri);
                        entry.deleted = true;
                        stats.deleted += 1;
                    }
                }
            }
            self.save_catalog_locked(&state);
            self.rebuild_playlist_locked(&mut state);
        }

        self.enforce_cache_limit();

        {
            let mut state = self.lock_state();
            state.progress.is_syncing = false;
            state.progress.stage = SyncStage::Complete;
            state.progress.completed_at = Some(Local::now());
        }
        tracing::info!(
            "sync complete: {} new, {} updated, {} deleted, {} unchanged, {} errors, \
             {} metadata updates",
            stats.new,
            stats.updated,
            stats.deleted,
            stats.unchanged,
            stats.errors,
            stats.metadata_updated
        );
        stats
    }

    fn enumerate_remote(&self, source: &SourceConfig) -> SourceResult<Vec<InventoryItem>> {
        let label = source.label();
        tracing::info!("inspecting remote album: {label}");
        let items = self.inspector.inventory(&source.url, &mut |_stage, current, _total| {
            let mut state = self.lock_state();
            state.progress.items_found = current;
        })?;
        Ok(items
            .into_iter()
            .map(|item| InventoryItem {
                uri: item.uri,
                kind: item.kind,
                source_type: SourceType::RemoteAlbum,
                album_label: label.clone(),
                caption: item.caption,
            })
            .collect())
    }

    /// An item already in the catalog was reported again: refresh its
    /// lifecycle fields, resurrect it if tombstoned, and re-index local files
    /// whose modification time moved.
    fn refresh_existing(
        &self,
        item: &InventoryItem,
        existing: &MediaEntry,
        now: DateTime<Local>,
        stats: &mut SyncStats,
    ) {
        match existing.source_type {
            SourceType::Local => {
                let Some(path) = path_from_file_uri(&item.uri) else {
                    stats.errors += 1;
                    return;
                };
                if !path.exists() {
                    // The file is gone even though the scan just reported it;
                    // treat it like any other disappearance.
                    let mut state = self.lock_state();
                    if let Some(entry) = state.catalog.get_mut(&existing.media_id) {
                        entry.deleted = true;
                    }
                    stats.deleted += 1;
                    return;
                }

                let mtime = file_mtime(&path);
                if mtime.is_some() && mtime != existing.file_mtime {
                    tracing::info!("local file changed, re-indexing: {}", path.display());
                    let metadata = self.metadata.extract(&path).unwrap_or_else(|e| {
                        tracing::debug!("failed to re-extract metadata: {e}");
                        Default::default()
                    });
                    let hash = content_hash(&path).unwrap_or_default();

                    let mut state = self.lock_state();
                    if let Some(entry) = state.catalog.get_mut(&existing.media_id) {
                        entry.last_seen = now;
                        entry.deleted = false;
                        entry.album_source = item.album_label.clone();
                        entry.exif_date = metadata.date_taken;
                        entry.embedded_caption = metadata.caption;
                        entry.gps = metadata.gps;
                        // Stale until re-geocoded from the new coordinates.
                        entry.exif_location = None;
                        entry.file_mtime = mtime;
                        entry.content_hash = hash;
                        entry.display_params = None;
                        entry.cached_faces = None;
                    }
                    stats.updated += 1;
                } else {
                    let mut state = self.lock_state();
                    if let Some(entry) = state.catalog.get_mut(&existing.media_id) {
                        entry.last_seen = now;
                        entry.deleted = false;
                        entry.album_source = item.album_label.clone();
                    }
                    stats.unchanged += 1;
                }
            }
            SourceType::RemoteAlbum => {
                let mut state = self.lock_state();
                if let Some(entry) = state.catalog.get_mut(&existing.media_id) {
                    entry.last_seen = now;
                    entry.deleted = false;
                    entry.album_source = item.album_label.clone();
                    if let Some(caption) = &item.caption
                        && Some(caption) != entry.remote_caption.as_ref()
                    {
                        entry.remote_caption = Some(caption.clone());
                        stats.updated += 1;
                        return;
                    }
                }
                stats.unchanged += 1;
            }
        }
    }

    /// Acquire one new (or force-refreshed) item: download remote bytes into
    /// the cache, or index the local file in place, then hash and extract
    /// embedded metadata.
    fn acquire_item(
        &self,
        item: &InventoryItem,
        id: &MediaId,
        now: DateTime<Local>,
        full_resolution: bool,
        max_dimension: u32,
    ) -> SourceResult<MediaEntry> {
        let (local_path, file_mtime) = match item.source_type {
            SourceType::Local => {
                let path = path_from_file_uri(&item.uri).ok_or_else(|| {
                    SourceError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("not a file uri: {}", item.uri),
                    ))
                })?;
                if !path.exists() {
                    return Err(SourceError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("local file not found: {}", path.display()),
                    )));
                }
                let mtime = file_mtime(&path);
                (path, mtime)
            }
            SourceType::RemoteAlbum => {
                let url = download_url(&item.uri, item.kind, full_resolution, max_dimension);
                let dest = self.cache_dir.join(cache_file_name(id, item.kind));
                self.fetcher.fetch(&url, &dest)?;
                tracing::info!("downloaded {}", dest.display());
                (dest, None)
            }
        };

        let hash = content_hash(&local_path).unwrap_or_default();
        let mut entry = MediaEntry {
            media_id: id.clone(),
            source_type: item.source_type,
            uri: item.uri.clone(),
            local_path,
            media_kind: item.kind,
            album_source: item.album_label.clone(),
            first_seen: now,
            last_seen: now,
            content_hash: hash,
            file_mtime,
            deleted: false,
            remote_caption: item.caption.clone(),
            embedded_caption: None,
            remote_location: None,
            exif_location: None,
            exif_date: None,
            remote_date: None,
            gps: None,
            remote_metadata_fetched: false,
            cached_faces: None,
            display_params: None,
            legacy_caption: None,
        };

        if item.kind == MediaKind::Photo {
            match self.metadata.extract(&entry.local_path) {
                Ok(metadata) => {
                    entry.exif_date = metadata.date_taken;
                    entry.embedded_caption = metadata.caption;
                    entry.gps = metadata.gps;
                }
                Err(e) => tracing::debug!("failed to extract metadata: {e}"),
            }
        }

        Ok(entry)
    }

    /// Which remote photos still need their album-side metadata, per the
    /// options; then one follow-up pass per source, persisting results as
    /// they stream in. Every callback marks the item as fetched, found or
    /// not, so no item is retried forever.
    fn remote_metadata_follow_up(
        &self,
        options: &SyncOptions,
        enabled: &[SourceConfig],
        new_remote_photos: &HashSet<String>,
        stats: &mut SyncStats,
    ) {
        let is_remote_photo = |e: &MediaEntry| {
            e.is_active()
                && e.media_kind == MediaKind::Photo
                && e.source_type == SourceType::RemoteAlbum
        };

        let uris: HashSet<String> = if options.force_refetch_all_metadata {
            let mut state = self.lock_state();
            let mut uris = HashSet::new();
            for entry in state.catalog.entries_mut() {
                if is_remote_photo(entry) {
                    entry.remote_metadata_fetched = false;
                    uris.insert(entry.uri.clone());
                }
            }
            self.save_catalog_locked(&state);
            tracing::info!("re-fetching remote metadata for all {} photos", uris.len());
            uris
        } else if options.update_all_missing_metadata {
            let state = self.lock_state();
            state
                .catalog
                .entries()
                .filter(|e| is_remote_photo(e) && !e.remote_metadata_fetched)
                .map(|e| e.uri.clone())
                .collect()
        } else {
            new_remote_photos.clone()
        };

        if uris.is_empty() {
            return;
        }
        tracing::info!("fetching remote metadata for {} photos", uris.len());

        {
            let mut state = self.lock_state();
            state.progress.stage = SyncStage::FetchingMetadata;
            state.progress.acquired_done = 0;
            state.progress.acquired_total = uris.len();
        }

        // Group by source so each album's detail views are visited together.
        let mut uris_by_label: HashMap<String, HashSet<String>> = HashMap::new();
        {
            let state = self.lock_state();
            for uri in &uris {
                if let Some(entry) = state.catalog.get(&MediaId::from_uri(uri)) {
                    uris_by_label
                        .entry(entry.album_source.clone())
                        .or_default()
                        .insert(uri.clone());
                }
            }
        }

        for source in enabled {
            if source.kind != SourceType::RemoteAlbum {
                continue;
            }
            let label = source.label();
            let Some(source_uris) = uris_by_label.get(&label) else {
                continue;
            };
            tracing::info!(
                "fetching metadata for {} photos from {label}",
                source_uris.len()
            );

            let mut since_save = 0usize;
            let mut updated = 0usize;
            let result = self.inspector.fetch_metadata(
                &source.url,
                source_uris,
                &mut |current, total| {
                    let mut state = self.lock_state();
                    state.progress.acquired_done = current;
                    state.progress.acquired_total = total;
                },
                &mut |item| {
                    let mut state = self.lock_state();
                    let id = MediaId::from_uri(&item.uri);
                    let Some(entry) = state.catalog.get_mut(&id) else {
                        return;
                    };
                    if let Some(caption) = &item.caption
                        && Some(caption) != entry.remote_caption.as_ref()
                    {
                        entry.remote_caption = Some(caption.clone());
                        updated += 1;
                    }
                    if let Some(location) = &item.location
                        && Some(location) != entry.remote_location.as_ref()
                    {
                        entry.remote_location = Some(location.clone());
                    }
                    if let Some(date) = item.date {
                        entry.remote_date = Some(date);
                    }
                    // Set even when everything above was empty: the attempt
                    // happened and must not repeat.
                    entry.remote_metadata_fetched = true;

                    since_save += 1;
                    if since_save >= 10 {
                        self.save_catalog_locked(&state);
                        since_save = 0;
                    }
                },
            );

            {
                let state = self.lock_state();
                self.save_catalog_locked(&state);
            }
            if let Err(e) = result {
                tracing::warn!("failed to fetch metadata from {label}: {e}");
                let mut state = self.lock_state();
                state.progress.error_message = e.to_string();
            }
            stats.metadata_updated += updated;
        }
    }

    /// Evict oldest-seen remote entries until the cache fits the configured
    /// limit. The only path that destroys an entry outright: the file and the
    /// record go together. Local originals are never deleted.
    pub(crate) fn enforce_cache_limit(&self) {
        let max_bytes = self.config.read().unwrap().cache.max_size_mb * 1024 * 1024;
        let mut state = self.lock_state();
        let mut total = state.catalog.total_bytes_on_disk();
        if total <= max_bytes {
            return;
        }
        tracing::info!(
            "cache size ({:.1} MB) exceeds limit ({} MB), evicting oldest entries",
            total as f64 / 1024.0 / 1024.0,
            max_bytes / 1024 / 1024
        );

        let mut candidates: Vec<(MediaId, PathBuf, u64, DateTime<Local>)> = state
            .catalog
            .entries()
            .filter(|e| e.source_type == SourceType::RemoteAlbum)
            .filter_map(|e| {
                fs::metadata(&e.local_path)
                    .ok()
                    .map(|m| (e.media_id.clone(), e.local_path.clone(), m.len(), e.last_seen))
            })
            .collect();
        candidates.sort_by_key(|(_, _, _, last_seen)| *last_seen);

        for (id, path, size, _) in candidates {
            if total <= max_bytes {
                break;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    total = total.saturating_sub(size);
                    state.catalog.remove(&id);
                    tracing::debug!("evicted {}", path.display());
                }
                Err(e) => tracing::warn!("failed to remove {}: {e}", path.display()),
            }
        }

        self.save_catalog_locked(&state);
        self.rebuild_playlist_locked(&mut state);
    }
}

fn file_mtime(path: &Path) -> Option<DateTime<Local>> {
    fs::metadata(path)
        .ok()?
        .modified()
        .ok()
        .map(DateTime::<Local>::from)
}
