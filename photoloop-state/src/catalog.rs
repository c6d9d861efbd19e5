use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{MediaEntry, MediaId, MediaKind, SettingsFingerprint, SourceType};

/// Name of the catalog file inside the cache directory.
pub const CATALOG_FILE_NAME: &str = "catalog.json";

/// Active-entry counts by media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaCounts {
    pub photos: usize,
    pub videos: usize,
    pub total: usize,
}

#[derive(Serialize)]
struct CatalogFileRef<'a> {
    media: &'a HashMap<MediaId, MediaEntry>,
    album_sync_times: &'a HashMap<String, DateTime<Local>>,
    last_updated: DateTime<Local>,
    settings: &'a SettingsFingerprint,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CatalogFile {
    media: HashMap<MediaId, MediaEntry>,
    album_sync_times: HashMap<String, DateTime<Local>>,
    settings: SettingsFingerprint,
}

/// Durable mapping of `media_id` to entry, plus per-source sync timestamps and
/// the settings fingerprint. The catalog itself is not synchronized; the
/// engine serializes access behind a single lock.
pub struct Catalog {
    path: PathBuf,
    media: HashMap<MediaId, MediaEntry>,
    album_sync_times: HashMap<String, DateTime<Local>>,
    fingerprint: SettingsFingerprint,
}

impl Catalog {
    /// Load the catalog from `cache_dir`, reconciling it against the current
    /// settings fingerprint:
    ///
    /// - acquisition settings changed: every stored file is stale, so remote
    ///   downloads are deleted and the catalog starts over empty;
    /// - face-detection settings changed: cached faces and the display
    ///   parameters built on them are cleared;
    /// - only scaling settings changed: display parameters are cleared, faces
    ///   are kept.
    ///
    /// A missing file yields an empty catalog. An unreadable file is treated
    /// the same way, after logging; the previous file is left on disk for
    /// inspection until the next save.
    pub fn load(cache_dir: &Path, fingerprint: SettingsFingerprint) -> Self {
        let path = cache_dir.join(CATALOG_FILE_NAME);
        let mut catalog = Catalog {
            path,
            media: HashMap::new(),
            album_sync_times: HashMap::new(),
            fingerprint,
        };

        let raw = match fs::read_to_string(&catalog.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return catalog,
            Err(e) => {
                tracing::error!("failed to read catalog {}: {e}", catalog.path.display());
                return catalog;
            }
        };

        let file: CatalogFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(
                    "catalog {} is unreadable, starting empty: {e}",
                    catalog.path.display()
                );
                return catalog;
            }
        };

        if file.settings.acquisition != catalog.fingerprint.acquisition && !file.media.is_empty() {
            tracing::warn!(
                "image acquisition settings changed (was {:?}, now {:?}); \
                 discarding {} entries to re-acquire at the new resolution",
                file.settings.acquisition,
                catalog.fingerprint.acquisition,
                file.media.len()
            );
            for entry in file.media.values() {
                if entry.source_type == SourceType::RemoteAlbum {
                    let _ = fs::remove_file(&entry.local_path);
                }
            }
            if let Err(e) = catalog.save() {
                tracing::error!("failed to persist cleared catalog: {e}");
            }
            return catalog;
        }

        catalog.media = file.media;
        catalog.album_sync_times = file.album_sync_times;
        for entry in catalog.media.values_mut() {
            entry.migrate_legacy_caption();
        }

        if file.settings.face_detection != catalog.fingerprint.face_detection {
            tracing::info!(
                "face detection settings changed, invalidating cached faces for {} entries",
                catalog.media.len()
            );
            for entry in catalog.media.values_mut() {
                entry.cached_faces = None;
                entry.display_params = None;
            }
            if let Err(e) = catalog.save() {
                tracing::error!("failed to persist catalog after face invalidation: {e}");
            }
        } else if file.settings.scaling != catalog.fingerprint.scaling {
            tracing::info!(
                "scaling settings changed, invalidating display parameters for {} entries \
                 (keeping cached faces)",
                catalog.media.len()
            );
            for entry in catalog.media.values_mut() {
                entry.display_params = None;
            }
            if let Err(e) = catalog.save() {
                tracing::error!("failed to persist catalog after scaling invalidation: {e}");
            }
        }

        tracing::info!("loaded {} catalog entries", catalog.media.len());
        catalog
    }

    /// Write the full catalog to disk. The document is serialized to a sibling
    /// temp file, flushed to durable storage, and renamed into place, so a
    /// crash mid-write leaves the previous file intact.
    pub fn save(&self) -> std::io::Result<()> {
        let document = CatalogFileRef {
            media: &self.media,
            album_sync_times: &self.album_sync_times,
            last_updated: Local::now(),
            settings: &self.fingerprint,
        };

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            serde_json::to_writer_pretty(&mut file, &document).map_err(std::io::Error::other)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fingerprint(&self) -> &SettingsFingerprint {
        &self.fingerprint
    }

    pub fn get(&self, id: &MediaId) -> Option<&MediaEntry> {
        self.media.get(id)
    }

    pub fn get_mut(&mut self, id: &MediaId) -> Option<&mut MediaEntry> {
        self.media.get_mut(id)
    }

    pub fn contains(&self, id: &MediaId) -> bool {
        self.media.contains_key(id)
    }

    /// Insert or replace an entry. Idempotent for identical entries.
    pub fn put(&mut self, entry: MediaEntry) {
        self.media.insert(entry.media_id.clone(), entry);
    }

    /// Remove an entry's record entirely. Does not touch its file.
    pub fn remove(&mut self, id: &MediaId) -> Option<MediaEntry> {
        self.media.remove(id)
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MediaEntry> {
        self.media.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut MediaEntry> {
        self.media.values_mut()
    }

    pub fn all_active(&self) -> impl Iterator<Item = &MediaEntry> {
        self.media.values().filter(|e| e.is_active())
    }

    pub fn count_by_kind(&self) -> MediaCounts {
        let photos = self
            .all_active()
            .filter(|e| e.media_kind == MediaKind::Photo)
            .count();
        let videos = self
            .all_active()
            .filter(|e| e.media_kind == MediaKind::Video)
            .count();
        MediaCounts {
            photos,
            videos,
            total: photos + videos,
        }
    }

    /// Sum of on-disk sizes of all active entries whose file still exists.
    pub fn total_bytes_on_disk(&self) -> u64 {
        self.all_active()
            .filter_map(|e| fs::metadata(&e.local_path).ok())
            .map(|m| m.len())
            .sum()
    }

    pub fn record_source_sync(&mut self, name: &str, at: DateTime<Local>) {
        self.album_sync_times.insert(name.to_string(), at);
    }

    pub fn source_sync_times(&self) -> &HashMap<String, DateTime<Local>> {
        &self.album_sync_times
    }

    /// Store a reverse-geocoded location on an entry. Returns false if the
    /// entry no longer exists.
    pub fn set_location(&mut self, id: &MediaId, location: Option<String>) -> bool {
        match self.media.get_mut(id) {
            Some(entry) => {
                entry.exif_location = location;
                true
            }
            None => false,
        }
    }

    /// Destroy every entry, deleting the on-disk files of remote downloads.
    /// Local originals are never removed.
    pub fn clear_all(&mut self) {
        for entry in self.media.values() {
            if entry.source_type == SourceType::RemoteAlbum {
                let _ = fs::remove_file(&entry.local_path);
            }
        }
        self.media.clear();
    }
}
