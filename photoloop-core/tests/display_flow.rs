//! The display side of the engine driven end to end with a scripted
//! renderer: tick advancement, display-parameter memoization, lazy face
//! detection, and background geocoding.

use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, RwLock,
    },
    time::Duration,
};

use photoloop_core::state::{
    DisplayMode, DisplayParams, FaceRegion, GpsCoordinates, MediaEntry, MediaId, PlaylistOrder,
};
use photoloop_core::shared::{CacheSettings, Config, ScheduleSettings, SourceConfig};
use photoloop_core::sources::{MediaFetcher, SourceResult, UnavailableInspector};
use photoloop_core::{
    AnnotatorError, FaceDetector, GeocodedPlace, LibraryArgs, MediaLibrary, MetadataExtractor,
    NoopMetadataExtractor, Orchestrator, PhotoMetadata, Renderer, ReverseGeocoder, Scheduler,
    SyncOptions, TickState,
};

struct NoFetch;

impl MediaFetcher for NoFetch {
    fn fetch(&self, _url: &str, _dest: &Path) -> SourceResult<()> {
        panic!("tests with local sources never download");
    }
}

/// Renderer that records everything it is told to show. Dwell is always
/// elapsed so every tick advances.
#[derive(Default)]
struct ScriptedRenderer {
    shown: Vec<MediaId>,
    modes: Vec<DisplayMode>,
    updated: Vec<MediaId>,
}

impl Renderer for ScriptedRenderer {
    fn set_mode(&mut self, mode: DisplayMode) {
        self.modes.push(mode);
    }

    fn show(&mut self, entry: &MediaEntry, _params: &DisplayParams) {
        self.shown.push(entry.media_id.clone());
    }

    fn is_transition_complete(&self) -> bool {
        true
    }

    fn is_dwell_elapsed(&self) -> bool {
        true
    }

    fn skip_next_requested(&mut self) -> bool {
        false
    }

    fn skip_previous_requested(&mut self) -> bool {
        false
    }

    fn resolution(&self) -> (u32, u32) {
        (1920, 1080)
    }

    fn notify_entry_updated(&mut self, media_id: &MediaId) {
        self.updated.push(media_id.clone());
    }

    fn update(&mut self) -> bool {
        true
    }
}

struct CountingFaceDetector {
    calls: AtomicUsize,
}

impl FaceDetector for CountingFaceDetector {
    fn detect(&self, _image_path: &Path) -> Result<Vec<FaceRegion>, AnnotatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![FaceRegion {
            x: 0.4,
            y: 0.3,
            width: 0.2,
            height: 0.2,
            confidence: 0.9,
        }])
    }
}

struct GpsMetadata;

impl MetadataExtractor for GpsMetadata {
    fn extract(&self, _image_path: &Path) -> Result<PhotoMetadata, AnnotatorError> {
        Ok(PhotoMetadata {
            gps: Some(GpsCoordinates {
                latitude: 40.015,
                longitude: -105.271,
            }),
            ..Default::default()
        })
    }
}

struct BoulderGeocoder;

impl ReverseGeocoder for BoulderGeocoder {
    fn reverse(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<Option<GeocodedPlace>, AnnotatorError> {
        Ok(Some(GeocodedPlace {
            city: Some("Boulder".to_string()),
            state: Some("Colorado".to_string()),
            country: Some("United States".to_string()),
            country_code: Some("US".to_string()),
        }))
    }
}

struct Fixture {
    _photos: tempfile::TempDir,
    _cache: tempfile::TempDir,
    library: Arc<MediaLibrary>,
    config: Arc<RwLock<Config>>,
}

fn fixture(
    file_names: &[&str],
    face_detector: Option<Arc<dyn FaceDetector>>,
    metadata: Arc<dyn MetadataExtractor>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
) -> Fixture {
    let photos = tempfile::tempdir().unwrap();
    for name in file_names {
        fs::write(photos.path().join(name), b"not really a jpeg").unwrap();
    }
    let cache = tempfile::tempdir().unwrap();

    let mut config = Config {
        sources: vec![SourceConfig {
            name: "Local".to_string(),
            kind: photoloop_core::state::SourceType::Local,
            path: photos.path().display().to_string(),
            ..Default::default()
        }],
        cache: CacheSettings {
            directory: cache.path().display().to_string(),
            max_size_mb: 1000,
        },
        // Always-on so ticks do not depend on the wall clock.
        schedule: ScheduleSettings {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    config.display.order = PlaylistOrder::Alphabetical;
    let config = Arc::new(RwLock::new(config));

    let library = Arc::new(MediaLibrary::new(LibraryArgs {
        config: config.clone(),
        inspector: Arc::new(UnavailableInspector),
        fetcher: Arc::new(NoFetch),
        metadata,
        face_detector,
        saliency: None,
        aesthetic: None,
        geocoder,
    }));
    library.sync(&SyncOptions::default());

    Fixture {
        _photos: photos,
        _cache: cache,
        library,
        config,
    }
}

#[test]
fn ticks_advance_through_the_playlist() {
    let f = fixture(
        &["a.jpg", "b.jpg"],
        None,
        Arc::new(NoopMetadataExtractor),
        None,
    );
    let scheduler = Arc::new(Scheduler::new(
        f.config.clone(),
        Arc::new(photoloop_core::BuiltinHolidays),
    ));
    let orchestrator = Orchestrator::new(f.library.clone(), scheduler);
    let commands = orchestrator.commands();

    let mut renderer = ScriptedRenderer::default();
    let mut tick_state = TickState::default();

    assert!(orchestrator.tick(&mut renderer, &mut tick_state));
    assert!(orchestrator.tick(&mut renderer, &mut tick_state));
    assert_eq!(renderer.modes, vec![DisplayMode::Slideshow]);
    assert_eq!(renderer.shown.len(), 2);
    assert_ne!(renderer.shown[0], renderer.shown[1]);

    // A previous request steps back to the first photo.
    commands.request_previous();
    assert!(orchestrator.tick(&mut renderer, &mut tick_state));
    assert_eq!(renderer.shown.len(), 3);
    assert_eq!(renderer.shown[2], renderer.shown[0]);

    // Pausing stops advancement without changing the mode.
    commands.set_paused(true);
    assert!(orchestrator.tick(&mut renderer, &mut tick_state));
    assert_eq!(renderer.shown.len(), 3);
    // No background annotations ran, so no update notifications either.
    assert!(renderer.updated.is_empty());
}

#[test]
fn no_enabled_sources_forces_black() {
    let f = fixture(
        &["a.jpg"],
        None,
        Arc::new(NoopMetadataExtractor),
        None,
    );
    f.config.write().unwrap().sources[0].enabled = false;

    let scheduler = Arc::new(Scheduler::new(
        f.config.clone(),
        Arc::new(photoloop_core::BuiltinHolidays),
    ));
    let orchestrator = Orchestrator::new(f.library.clone(), scheduler);
    let mut renderer = ScriptedRenderer::default();
    let mut tick_state = TickState::default();

    assert!(orchestrator.tick(&mut renderer, &mut tick_state));
    assert_eq!(renderer.modes, vec![DisplayMode::Black]);
    assert!(renderer.shown.is_empty());
}

#[test]
fn display_params_are_memoized_per_resolution() {
    let detector = Arc::new(CountingFaceDetector {
        calls: AtomicUsize::new(0),
    });
    let f = fixture(
        &["a.jpg"],
        Some(detector.clone()),
        Arc::new(NoopMetadataExtractor),
        None,
    );
    let id = f.library.all_media()[0].media_id.clone();

    let first = f.library.display_params(&id, (3840, 2160)).unwrap();
    assert_eq!(first.screen_resolution, (3840, 2160));
    assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

    // Same resolution: served from the entry, nothing recomputed.
    let second = f.library.display_params(&id, (3840, 2160)).unwrap();
    assert_eq!(second, first);
    assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

    // New resolution: recomputed and overwritten, but the faces were cached
    // so the detector still ran only once.
    let third = f.library.display_params(&id, (1920, 1080)).unwrap();
    assert_eq!(third.screen_resolution, (1920, 1080));
    assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    let stored = f.library.get_entry(&id).unwrap();
    assert_eq!(stored.display_params.unwrap().screen_resolution, (1920, 1080));
    assert!(stored.cached_faces.is_some());
}

#[test]
fn controller_exposes_status_sources_and_items() {
    use photoloop_core::{ControlAction, Controller};

    let f = fixture(
        &["a.jpg"],
        None,
        Arc::new(NoopMetadataExtractor),
        None,
    );
    let scheduler = Arc::new(Scheduler::new(
        f.config.clone(),
        Arc::new(photoloop_core::BuiltinHolidays),
    ));
    let orchestrator = Orchestrator::new(f.library.clone(), scheduler.clone());
    let controller = Controller::new(f.library.clone(), scheduler.clone(), orchestrator.commands());

    let status = controller.status();
    assert_eq!(status.counts.photos, 1);
    assert_eq!(status.display_mode, DisplayMode::Slideshow);
    assert!(!status.sync.is_syncing);

    let items = controller.list_items();
    assert_eq!(items.len(), 1);
    assert!(items[0].local_path.ends_with("a.jpg"));

    // Source management round trip.
    let sources = controller.list_sources();
    assert_eq!(sources.len(), 1);
    assert!(sources[0].last_sync.is_some());
    controller
        .add_source(SourceConfig {
            name: "Second".to_string(),
            kind: photoloop_core::state::SourceType::RemoteAlbum,
            url: "https://photos.example/album/x".to_string(),
            ..Default::default()
        })
        .unwrap();
    controller.set_source_enabled(1, false).unwrap();
    assert!(!controller.list_sources()[1].enabled);
    controller.remove_source(1).unwrap();
    assert_eq!(controller.list_sources().len(), 1);
    assert!(controller.remove_source(5).is_err());
    assert!(controller
        .add_source(SourceConfig {
            kind: photoloop_core::state::SourceType::Local,
            ..Default::default()
        })
        .is_err());

    // Control actions reach the scheduler and playback commands.
    controller.control(ControlAction::ForceBlack);
    assert_eq!(scheduler.display_mode_now(), DisplayMode::Black);
    controller.control(ControlAction::ClearOverride);
    assert_eq!(scheduler.display_mode_now(), DisplayMode::Slideshow);
    controller.control(ControlAction::Pause);
    assert!(controller.status().paused);
    controller.control(ControlAction::Resume);
    assert!(!controller.status().paused);
}

#[test]
fn background_geocoding_fills_location_and_notifies() {
    let f = fixture(
        &["a.jpg"],
        None,
        Arc::new(GpsMetadata),
        Some(Arc::new(BoulderGeocoder)),
    );
    let id = f.library.all_media()[0].media_id.clone();
    assert!(f.library.get_entry(&id).unwrap().exif_location.is_none());

    let (tx, rx) = mpsc::channel();
    f.library.spawn_geocode_if_needed(&id, tx);

    let notified = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(notified, id);
    assert_eq!(
        f.library.get_entry(&id).unwrap().exif_location.as_deref(),
        Some("Boulder, CO")
    );

    // A second request is a no-op: the location is already present.
    let (tx, rx) = mpsc::channel();
    f.library.spawn_geocode_if_needed(&id, tx);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}
