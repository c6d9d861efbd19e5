//! End-to-end sync cycles against fake sources: reconciliation, the deletion
//! safety gate, partial failure, metadata follow-up, and cache eviction.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
    sync::{Arc, Mutex, RwLock},
};

use photoloop_core::{
    AnnotatorError, LibraryArgs, MediaLibrary, MetadataExtractor, NoopMetadataExtractor,
    PhotoMetadata, SyncOptions,
};
use photoloop_core::shared::{CacheSettings, Config, SourceConfig};
use photoloop_core::sources::{
    InspectStage, InspectorError, MediaFetcher, RemoteAlbumInspector, RemoteItem,
    RemoteItemMetadata, SourceResult,
};
use photoloop_core::state::{MediaId, MediaKind, SourceType};

/// Inspector whose inventories and per-item metadata are set by the test.
/// An album URL with no configured inventory fails, like a crashed browser.
#[derive(Default)]
struct FakeInspector {
    inventories: Mutex<HashMap<String, Vec<String>>>,
    metadata: Mutex<HashMap<String, RemoteItemMetadata>>,
}

impl FakeInspector {
    fn set_inventory(&self, album_url: &str, uris: &[&str]) {
        self.inventories
            .lock()
            .unwrap()
            .insert(album_url.to_string(), uris.iter().map(|s| s.to_string()).collect());
    }

    fn fail(&self, album_url: &str) {
        self.inventories.lock().unwrap().remove(album_url);
    }

    fn set_metadata(&self, uri: &str, caption: Option<&str>, location: Option<&str>) {
        self.metadata.lock().unwrap().insert(
            uri.to_string(),
            RemoteItemMetadata {
                uri: uri.to_string(),
                caption: caption.map(|s| s.to_string()),
                location: location.map(|s| s.to_string()),
                date: None,
            },
        );
    }
}

impl RemoteAlbumInspector for FakeInspector {
    fn inventory(
        &self,
        album_url: &str,
        progress: &mut dyn FnMut(InspectStage, usize, usize),
    ) -> Result<Vec<RemoteItem>, InspectorError> {
        let inventories = self.inventories.lock().unwrap();
        let uris = inventories
            .get(album_url)
            .ok_or_else(|| InspectorError::new(format!("browser crashed on {album_url}")))?;
        progress(InspectStage::Complete, uris.len(), uris.len());
        Ok(uris
            .iter()
            .map(|uri| RemoteItem {
                uri: uri.clone(),
                kind: MediaKind::Photo,
                caption: None,
            })
            .collect())
    }

    fn fetch_metadata(
        &self,
        _album_url: &str,
        uris: &HashSet<String>,
        progress: &mut dyn FnMut(usize, usize),
        on_item: &mut dyn FnMut(RemoteItemMetadata),
    ) -> Result<(), InspectorError> {
        let metadata = self.metadata.lock().unwrap();
        for (done, uri) in uris.iter().enumerate() {
            let item = metadata.get(uri).cloned().unwrap_or(RemoteItemMetadata {
                uri: uri.clone(),
                caption: None,
                location: None,
                date: None,
            });
            on_item(item);
            progress(done + 1, uris.len());
        }
        Ok(())
    }
}

/// Fetcher that writes a configurable number of bytes instead of hitting the
/// network.
struct FakeFetcher {
    bytes_per_file: usize,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        FakeFetcher { bytes_per_file: 64 }
    }
}

impl MediaFetcher for FakeFetcher {
    fn fetch(&self, _url: &str, dest: &Path) -> SourceResult<()> {
        fs::write(dest, vec![0xabu8; self.bytes_per_file])?;
        Ok(())
    }
}

struct FixedMetadata(PhotoMetadata);

impl MetadataExtractor for FixedMetadata {
    fn extract(&self, _image_path: &Path) -> Result<PhotoMetadata, AnnotatorError> {
        Ok(self.0.clone())
    }
}

fn remote_source(name: &str, url: &str) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        kind: SourceType::RemoteAlbum,
        url: url.to_string(),
        ..Default::default()
    }
}

fn local_source(name: &str, path: &Path) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        kind: SourceType::Local,
        path: path.display().to_string(),
        ..Default::default()
    }
}

struct Fixture {
    _cache_dir: tempfile::TempDir,
    library: Arc<MediaLibrary>,
    inspector: Arc<FakeInspector>,
}

fn fixture_with(sources: Vec<SourceConfig>, fetcher: FakeFetcher) -> Fixture {
    let cache_dir = tempfile::tempdir().unwrap();
    let config = Config {
        sources,
        cache: CacheSettings {
            directory: cache_dir.path().display().to_string(),
            max_size_mb: 1000,
        },
        ..Default::default()
    };
    let inspector = Arc::new(FakeInspector::default());
    let library = Arc::new(MediaLibrary::new(LibraryArgs {
        config: Arc::new(RwLock::new(config)),
        inspector: inspector.clone(),
        fetcher: Arc::new(fetcher),
        metadata: Arc::new(NoopMetadataExtractor),
        face_detector: None,
        saliency: None,
        aesthetic: None,
        geocoder: None,
    }));
    Fixture {
        _cache_dir: cache_dir,
        library,
        inspector,
    }
}

fn fixture(sources: Vec<SourceConfig>) -> Fixture {
    fixture_with(sources, FakeFetcher::default())
}

fn active_uris(library: &MediaLibrary) -> HashSet<String> {
    library
        .all_media()
        .into_iter()
        .map(|entry| entry.uri)
        .collect()
}

const ALBUM: &str = "https://photos.example/album/s1";

#[test]
fn sync_adds_and_tombstones() {
    let f = fixture(vec![remote_source("S1", ALBUM)]);
    f.inspector
        .set_inventory(ALBUM, &["https://media/a", "https://media/b"]);
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.new, 2);
    assert_eq!(stats.errors, 0);

    // The album now contains A and C. B gets tombstoned, not destroyed.
    f.inspector
        .set_inventory(ALBUM, &["https://media/a", "https://media/c"]);
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.new, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.errors, 0);

    let active = active_uris(&f.library);
    assert_eq!(
        active,
        HashSet::from(["https://media/a".to_string(), "https://media/c".to_string()])
    );
    let b = f
        .library
        .get_entry(&MediaId::from_uri("https://media/b"))
        .unwrap();
    assert!(b.deleted);
}

#[test]
fn tombstoned_entry_is_resurrected_when_reported_again() {
    let f = fixture(vec![remote_source("S1", ALBUM)]);
    f.inspector
        .set_inventory(ALBUM, &["https://media/a", "https://media/b"]);
    f.library.sync(&SyncOptions::default());

    f.inspector.set_inventory(ALBUM, &["https://media/a"]);
    f.library.sync(&SyncOptions::default());
    assert!(
        f.library
            .get_entry(&MediaId::from_uri("https://media/b"))
            .unwrap()
            .deleted
    );

    f.inspector
        .set_inventory(ALBUM, &["https://media/a", "https://media/b"]);
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.new, 0);
    let b = f
        .library
        .get_entry(&MediaId::from_uri("https://media/b"))
        .unwrap();
    assert!(!b.deleted);
}

#[test]
fn failed_source_never_wipes_the_catalog() {
    let f = fixture(vec![remote_source("S1", ALBUM)]);
    let uris: Vec<String> = (0..10).map(|i| format!("https://media/{i}")).collect();
    let uri_refs: Vec<&str> = uris.iter().map(|s| s.as_str()).collect();
    f.inspector.set_inventory(ALBUM, &uri_refs);
    f.library.sync(&SyncOptions::default());
    assert_eq!(f.library.media_counts().total, 10);

    // The inspector now fails outright. Everything is preserved.
    f.inspector.fail(ALBUM);
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.deleted, 0);
    assert_eq!(f.library.media_counts().total, 10);
}

#[test]
fn implausibly_small_inventory_skips_deletion() {
    let f = fixture(vec![remote_source("S1", ALBUM)]);
    let uris: Vec<String> = (0..10).map(|i| format!("https://media/{i}")).collect();
    let uri_refs: Vec<&str> = uris.iter().map(|s| s.as_str()).collect();
    f.inspector.set_inventory(ALBUM, &uri_refs);
    f.library.sync(&SyncOptions::default());

    // Three of ten items is below the safety floor of five; the other seven
    // stay active even though they were not reported.
    f.inspector.set_inventory(
        ALBUM,
        &["https://media/0", "https://media/1", "https://media/2"],
    );
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.unchanged, 3);
    assert_eq!(f.library.media_counts().total, 10);
}

#[test]
fn partial_failure_preserves_the_failed_sources_items() {
    const ALBUM2: &str = "https://photos.example/album/s2";
    let f = fixture(vec![
        remote_source("S1", ALBUM),
        remote_source("S2", ALBUM2),
    ]);
    f.inspector.set_inventory(ALBUM, &["https://media/a"]);
    f.inspector.set_inventory(ALBUM2, &["https://media/b"]);
    f.library.sync(&SyncOptions::default());
    assert_eq!(f.library.media_counts().total, 2);

    // S2 fails this cycle. Its item B must survive even though the overall
    // item count cleared the safety floor.
    f.inspector.fail(ALBUM2);
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.deleted, 0);
    assert_eq!(
        active_uris(&f.library),
        HashSet::from(["https://media/a".to_string(), "https://media/b".to_string()])
    );
}

#[test]
fn disabled_sources_are_left_alone() {
    let f = fixture(vec![remote_source("S1", ALBUM)]);
    f.inspector
        .set_inventory(ALBUM, &["https://media/a", "https://media/b"]);
    f.library.sync(&SyncOptions::default());

    f.library.config().write().unwrap().sources[0].enabled = false;
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.deleted, 0);
    // Entries survive but are no longer in the playlist's enabled set.
    assert_eq!(f.library.media_counts().total, 2);
    assert!(f.library.next_media().is_none());
}

#[test]
fn metadata_follow_up_marks_every_item_fetched() {
    let f = fixture(vec![remote_source("S1", ALBUM)]);
    f.inspector
        .set_inventory(ALBUM, &["https://media/a", "https://media/b"]);
    f.inspector
        .set_metadata("https://media/a", Some("at the beach"), Some("Nice, France"));
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.metadata_updated, 1);

    let a = f
        .library
        .get_entry(&MediaId::from_uri("https://media/a"))
        .unwrap();
    assert_eq!(a.remote_caption.as_deref(), Some("at the beach"));
    assert_eq!(a.remote_location.as_deref(), Some("Nice, France"));
    assert!(a.remote_metadata_fetched);

    // B had nothing to offer, but the attempt is recorded so it will not be
    // retried on the next cycle.
    let b = f
        .library
        .get_entry(&MediaId::from_uri("https://media/b"))
        .unwrap();
    assert!(b.remote_caption.is_none());
    assert!(b.remote_metadata_fetched);
}

#[test]
fn force_refetch_updates_already_fetched_items() {
    let f = fixture(vec![remote_source("S1", ALBUM)]);
    f.inspector.set_inventory(ALBUM, &["https://media/a"]);
    f.library.sync(&SyncOptions::default());

    f.inspector
        .set_metadata("https://media/a", Some("new caption"), None);
    // A plain sync has nothing new, so no follow-up happens.
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.metadata_updated, 0);

    let stats = f.library.sync(&SyncOptions {
        force_refetch_all_metadata: true,
        ..Default::default()
    });
    assert_eq!(stats.metadata_updated, 1);
    let a = f
        .library
        .get_entry(&MediaId::from_uri("https://media/a"))
        .unwrap();
    assert_eq!(a.remote_caption.as_deref(), Some("new caption"));
}

#[test]
fn local_files_index_refresh_and_tombstone() {
    let photos = tempfile::tempdir().unwrap();
    fs::write(photos.path().join("a.jpg"), b"first version").unwrap();
    fs::write(photos.path().join("b.jpg"), b"other photo").unwrap();

    let f = fixture(vec![local_source("Family", photos.path())]);
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.new, 2);

    let a_uri = format!("file://{}/a.jpg", photos.path().display());
    let a_id = MediaId::from_uri(&a_uri);
    let first_hash = f.library.get_entry(&a_id).unwrap().content_hash.clone();

    // Rewrite the file with a clearly different mtime.
    fs::write(photos.path().join("a.jpg"), b"second version, longer").unwrap();
    let file = fs::File::options()
        .write(true)
        .open(photos.path().join("a.jpg"))
        .unwrap();
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
        .unwrap();
    drop(file);

    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.unchanged, 1);
    let a = f.library.get_entry(&a_id).unwrap();
    assert_ne!(a.content_hash, first_hash);
    assert!(a.display_params.is_none());
    assert!(a.cached_faces.is_none());

    // Deleting the file from disk tombstones the entry on the next sync.
    fs::remove_file(photos.path().join("b.jpg")).unwrap();
    let stats = f.library.sync(&SyncOptions::default());
    assert_eq!(stats.deleted, 1);
    assert_eq!(f.library.media_counts().total, 1);
}

#[test]
fn local_metadata_is_extracted_on_index() {
    let photos = tempfile::tempdir().unwrap();
    fs::write(photos.path().join("a.jpg"), b"bytes").unwrap();

    let cache_dir = tempfile::tempdir().unwrap();
    let config = Config {
        sources: vec![local_source("Family", photos.path())],
        cache: CacheSettings {
            directory: cache_dir.path().display().to_string(),
            max_size_mb: 1000,
        },
        ..Default::default()
    };
    let metadata = PhotoMetadata {
        caption: Some("embedded caption".to_string()),
        gps: Some(photoloop_core::state::GpsCoordinates {
            latitude: 48.8566,
            longitude: 2.3522,
        }),
        ..Default::default()
    };
    let library = MediaLibrary::new(LibraryArgs {
        config: Arc::new(RwLock::new(config)),
        inspector: Arc::new(FakeInspector::default()),
        fetcher: Arc::new(FakeFetcher::default()),
        metadata: Arc::new(FixedMetadata(metadata)),
        face_detector: None,
        saliency: None,
        aesthetic: None,
        geocoder: None,
    });
    library.sync(&SyncOptions::default());

    let entries = library.all_media();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].embedded_caption.as_deref(), Some("embedded caption"));
    assert!(entries[0].gps.is_some());
    assert!(entries[0].file_mtime.is_some());
}

#[test]
fn eviction_removes_oldest_seen_remote_entries_and_their_files() {
    let f = fixture_with(
        vec![remote_source("S1", ALBUM)],
        FakeFetcher {
            bytes_per_file: 1024 * 1024,
        },
    );
    f.inspector.set_inventory(
        ALBUM,
        &["https://media/a", "https://media/b", "https://media/c"],
    );
    f.library.sync(&SyncOptions::default());
    assert_eq!(f.library.media_counts().total, 3);

    // A falls out of the album, so its last_seen goes stale.
    std::thread::sleep(std::time::Duration::from_millis(50));
    f.inspector
        .set_inventory(ALBUM, &["https://media/b", "https://media/c"]);
    f.library.sync(&SyncOptions::default());

    let a_id = MediaId::from_uri("https://media/a");
    let a_path = f.library.get_entry(&a_id).unwrap().local_path.clone();
    assert!(a_path.exists());

    // Tighten the limit below the active 2 MB and re-enforce: the stalest
    // entry goes first, file and record together.
    f.library.config().write().unwrap().cache.max_size_mb = 1;
    f.library.sync(&SyncOptions::default());

    assert!(f.library.get_entry(&a_id).is_none());
    assert!(!a_path.exists());
    assert_eq!(f.library.media_counts().total, 2);
}

#[test]
fn force_full_reacquires_existing_items() {
    let f = fixture(vec![remote_source("S1", ALBUM)]);
    f.inspector.set_inventory(ALBUM, &["https://media/a"]);
    f.library.sync(&SyncOptions::default());

    let stats = f.library.sync(&SyncOptions {
        force_full: true,
        ..Default::default()
    });
    assert_eq!(stats.new, 1);
    assert_eq!(stats.unchanged, 0);
}

#[test]
fn playlist_serves_synced_media() {
    let photos = tempfile::tempdir().unwrap();
    fs::write(photos.path().join("a.jpg"), b"a").unwrap();
    fs::write(photos.path().join("b.jpg"), b"b").unwrap();

    let f = fixture(vec![local_source("Family", photos.path())]);
    f.library.config().write().unwrap().display.order =
        photoloop_core::state::PlaylistOrder::Alphabetical;
    f.library.sync(&SyncOptions::default());

    let first = f.library.next_media().unwrap();
    let second = f.library.next_media().unwrap();
    assert!(first.local_path.ends_with("a.jpg"));
    assert!(second.local_path.ends_with("b.jpg"));
    let back = f.library.previous_media().unwrap();
    assert_eq!(back.media_id, first.media_id);
}
