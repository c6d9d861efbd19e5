use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use photoloop_state::{
    AcquisitionFingerprint, CropBias, DisplayMode, FaceDetectionFingerprint, FacePosition,
    FallbackCrop, MediaEntry, PlaylistOrder, ScalingFingerprint, ScalingMode,
    SettingsFingerprint, SmartCropMethod, SourceType,
};

/// Paths searched for a config file, in order, when none is given explicitly.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/photoloop/config.toml",
    "~/.config/photoloop/config.toml",
    "./config.toml",
];

/// Identifier of the face-detection model the external detector is expected
/// to run; recorded in the settings fingerprint so a model swap invalidates
/// cached faces.
pub const FACE_DETECTOR_MODEL: &str = "yunet_2023mar";

/// One configured media source: a public web album or a local directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// Display name; falls back to the URL or path when empty.
    pub name: String,
    pub kind: SourceType,
    /// Album URL, for remote sources.
    pub url: String,
    /// Directory path, for local sources.
    pub path: String,
    pub enabled: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: SourceType::RemoteAlbum,
            url: String::new(),
            path: String::new(),
            enabled: true,
        }
    }
}

impl SourceConfig {
    /// Label used to scope catalog entries to this source.
    pub fn label(&self) -> String {
        if !self.name.is_empty() {
            self.name.clone()
        } else {
            match self.kind {
                SourceType::RemoteAlbum => self.url.clone(),
                SourceType::Local => self.path.clone(),
            }
        }
    }

    /// Whether this source has enough configuration to participate in a sync.
    pub fn is_usable(&self) -> bool {
        match self.kind {
            SourceType::RemoteAlbum => !self.url.is_empty(),
            SourceType::Local => !self.path.is_empty(),
        }
    }

    /// Local directory with a leading `~` expanded.
    pub fn directory(&self) -> PathBuf {
        expand_tilde(&self.path)
    }
}

/// Background sync settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Minutes between cycles; 0 disables the background sync thread.
    pub interval_minutes: u32,
    /// Run one sync shortly after startup.
    pub sync_on_start: bool,
    /// Anchor the first scheduled cycle to this wall-clock time ("HH:MM").
    pub sync_time: Option<String>,
    pub full_resolution: bool,
    pub max_dimension: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 1440,
            sync_on_start: false,
            sync_time: None,
            full_resolution: true,
            max_dimension: 1920,
        }
    }
}

/// Slideshow behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplaySettings {
    pub photo_duration_seconds: u32,
    pub video_enabled: bool,
    pub order: PlaylistOrder,
    /// Photos older than this all share the minimum weight.
    pub recency_cutoff_years: f32,
    /// Weight at the cutoff age; 1.0 means no recency bias at all.
    pub recency_min_weight: f32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            photo_duration_seconds: 30,
            video_enabled: true,
            order: PlaylistOrder::Random,
            recency_cutoff_years: 5.0,
            recency_min_weight: 0.33,
        }
    }
}

/// Scaling and smart-crop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingSettings {
    pub mode: ScalingMode,
    pub smart_crop_method: SmartCropMethod,
    pub face_detection: bool,
    pub face_position: FacePosition,
    pub fallback_crop: FallbackCrop,
    /// For balanced mode: max percentage of the image that may be cropped.
    pub max_crop_percent: u8,
    pub saliency_threshold: f32,
    pub saliency_coverage: f32,
    pub crop_bias: CropBias,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            mode: ScalingMode::Fill,
            smart_crop_method: SmartCropMethod::Face,
            face_detection: true,
            face_position: FacePosition::Center,
            fallback_crop: FallbackCrop::Center,
            max_crop_percent: 15,
            saliency_threshold: 0.3,
            saliency_coverage: 0.9,
            crop_bias: CropBias::None,
        }
    }
}

/// Slow zoom-and-pan animation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KenBurnsSettings {
    pub enabled: bool,
    /// (min_zoom, max_zoom); 1.0 is no zoom.
    pub zoom_range: (f32, f32),
    /// Pan speed as a fraction of the image per second.
    pub pan_speed: f32,
    pub randomize: bool,
}

impl Default for KenBurnsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            zoom_range: (1.0, 1.15),
            pan_speed: 0.02,
            randomize: true,
        }
    }
}

/// One of the four independent caption fields an entry may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionSource {
    RemoteCaption,
    EmbeddedCaption,
    RemoteLocation,
    ExifLocation,
}

impl CaptionSource {
    fn value<'a>(&self, entry: &'a MediaEntry) -> Option<&'a str> {
        match self {
            CaptionSource::RemoteCaption => entry.remote_caption.as_deref(),
            CaptionSource::EmbeddedCaption => entry.embedded_caption.as_deref(),
            CaptionSource::RemoteLocation => entry.remote_location.as_deref(),
            CaptionSource::ExifLocation => entry.exif_location.as_deref(),
        }
    }

    fn is_location(&self) -> bool {
        matches!(
            self,
            CaptionSource::RemoteLocation | CaptionSource::ExifLocation
        )
    }
}

/// Overlay settings. The caption shown on screen is selected here at display
/// time; the four source fields are never merged at ingest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlaySettings {
    pub enabled: bool,
    pub show_date: bool,
    pub show_caption: bool,
    /// Caption sources in priority order.
    pub caption_sources: Vec<CaptionSource>,
    /// How many sources with data to combine into the displayed caption.
    pub max_caption_sources: usize,
    pub caption_separator: String,
    pub max_caption_length: usize,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            show_date: true,
            show_caption: true,
            caption_sources: vec![
                CaptionSource::RemoteCaption,
                CaptionSource::EmbeddedCaption,
                CaptionSource::RemoteLocation,
                CaptionSource::ExifLocation,
            ],
            max_caption_sources: 1,
            caption_separator: " | ".to_string(),
            max_caption_length: 200,
        }
    }
}

impl OverlaySettings {
    /// Whether the overlay would show a location if one were known; gates the
    /// lazy reverse-geocoding work.
    pub fn wants_location(&self) -> bool {
        self.enabled
            && self.show_caption
            && self.caption_sources.iter().any(|s| s.is_location())
    }

    /// Pick the caption to display for an entry, honoring source priority and
    /// `max_caption_sources`.
    pub fn select_caption(&self, entry: &MediaEntry) -> Option<String> {
        if !self.enabled || !self.show_caption {
            return None;
        }
        let parts: Vec<&str> = self
            .caption_sources
            .iter()
            .filter_map(|s| s.value(entry))
            .filter(|s| !s.is_empty())
            .take(self.max_caption_sources.max(1))
            .collect();
        if parts.is_empty() {
            return None;
        }
        let mut caption = parts.join(&self.caption_separator);
        if caption.len() > self.max_caption_length {
            let mut end = self.max_caption_length;
            while !caption.is_char_boundary(end) {
                end -= 1;
            }
            caption.truncate(end);
        }
        Some(caption)
    }
}

/// One span within a day's schedule. Times are "HH:MM"; "24:00" means the
/// last instant of the day. A day's events must cover [00:00, 24:00) without
/// overlapping; overnight periods are represented as two events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEvent {
    pub start_time: String,
    pub end_time: String,
    pub mode: DisplayMode,
}

impl ScheduleEvent {
    pub fn new(start_time: &str, end_time: &str, mode: DisplayMode) -> Self {
        ScheduleEvent {
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            mode,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct HolidaySettings {
    /// Use the weekend schedule on holidays.
    pub use_weekend_schedule: bool,
    /// ISO country codes to check, e.g. "US", "FR".
    pub countries: Vec<String>,
}

/// Time-of-day scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub weekday: Vec<ScheduleEvent>,
    pub weekend: Vec<ScheduleEvent>,
    /// Per-weekday overrides keyed by lowercase day name ("monday".."sunday").
    pub overrides: HashMap<String, Vec<ScheduleEvent>>,
    pub holidays: HolidaySettings,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weekday: vec![
                ScheduleEvent::new("00:00", "07:00", DisplayMode::Black),
                ScheduleEvent::new("07:00", "22:00", DisplayMode::Slideshow),
                ScheduleEvent::new("22:00", "24:00", DisplayMode::Black),
            ],
            weekend: vec![
                ScheduleEvent::new("00:00", "08:00", DisplayMode::Black),
                ScheduleEvent::new("08:00", "23:00", DisplayMode::Slideshow),
                ScheduleEvent::new("23:00", "24:00", DisplayMode::Black),
            ],
            overrides: HashMap::new(),
            holidays: HolidaySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub directory: String,
    pub max_size_mb: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: "/var/lib/photoloop/cache".to_string(),
            max_size_mb: 1000,
        }
    }
}

impl CacheSettings {
    /// Cache directory with a leading `~` expanded.
    pub fn directory_path(&self) -> PathBuf {
        expand_tilde(&self.directory)
    }
}

/// Settings for the external web layer; carried here so the control surface
/// can report them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub sources: Vec<SourceConfig>,
    pub sync: SyncSettings,
    pub display: DisplaySettings,
    pub scaling: ScalingSettings,
    pub ken_burns: KenBurnsSettings,
    pub overlay: OverlaySettings,
    pub schedule: ScheduleSettings,
    pub cache: CacheSettings,
    pub web: WebSettings,

    /// Where this config was loaded from; used by config reload.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Labels of the sources currently enabled.
    pub fn enabled_source_labels(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.label())
            .collect()
    }

    pub fn has_enabled_sources(&self) -> bool {
        self.sources.iter().any(|s| s.enabled)
    }

    /// Derive the settings fingerprint stored on the catalog header.
    pub fn fingerprint(&self) -> SettingsFingerprint {
        SettingsFingerprint {
            acquisition: AcquisitionFingerprint {
                max_dimension: self.sync.max_dimension,
                full_resolution: self.sync.full_resolution,
            },
            scaling: ScalingFingerprint {
                mode: self.scaling.mode,
                max_crop_percent: self.scaling.max_crop_percent,
                smart_crop_method: self.scaling.smart_crop_method,
                face_position: self.scaling.face_position,
                fallback_crop: self.scaling.fallback_crop,
                saliency_threshold: self.scaling.saliency_threshold,
                saliency_coverage: self.scaling.saliency_coverage,
                crop_bias: self.scaling.crop_bias,
            },
            face_detection: FaceDetectionFingerprint {
                enabled: self.scaling.face_detection,
                confidence_threshold: 0.6,
                model: FACE_DETECTOR_MODEL.to_string(),
            },
        }
    }

    /// Validate policy values, collecting every problem rather than stopping
    /// at the first.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        let mut errors = Vec::new();

        for (i, source) in self.sources.iter().enumerate() {
            match source.kind {
                SourceType::RemoteAlbum => {
                    if source.url.is_empty() {
                        errors.push(format!("source {} (remote album) has no url", i + 1));
                    } else if !source.url.starts_with("http://")
                        && !source.url.starts_with("https://")
                    {
                        errors.push(format!(
                            "source {} url must start with http:// or https://",
                            i + 1
                        ));
                    }
                }
                SourceType::Local => {
                    if source.path.is_empty() {
                        errors.push(format!("source {} (local) has no path", i + 1));
                    }
                }
            }
        }

        if self.scaling.max_crop_percent > 50 {
            errors.push("scaling.max_crop_percent must be between 0 and 50".to_string());
        }
        if !(0.0..=1.0).contains(&self.scaling.saliency_threshold) {
            errors.push("scaling.saliency_threshold must be between 0 and 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.scaling.saliency_coverage) {
            errors.push("scaling.saliency_coverage must be between 0 and 1".to_string());
        }

        let (min_zoom, max_zoom) = self.ken_burns.zoom_range;
        if min_zoom > max_zoom {
            errors.push("ken_burns.zoom_range min must be <= max".to_string());
        }
        if min_zoom < 1.0 {
            errors.push("ken_burns.zoom_range values must be >= 1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.display.recency_min_weight)
            || self.display.recency_min_weight == 0.0
        {
            errors.push("display.recency_min_weight must be in (0, 1]".to_string());
        }
        if self.display.recency_cutoff_years <= 0.0 {
            errors.push("display.recency_cutoff_years must be positive".to_string());
        }

        if self.cache.max_size_mb < 100 {
            errors.push("cache.max_size_mb should be at least 100".to_string());
        }
        if self.web.port == 0 {
            errors.push("web.port must be nonzero".to_string());
        }

        for (day, events) in std::iter::once(("weekday", &self.schedule.weekday))
            .chain(std::iter::once(("weekend", &self.schedule.weekend)))
            .chain(self.schedule.overrides.iter().map(|(k, v)| (k.as_str(), v)))
        {
            for event in events {
                if parse_hhmm(&event.start_time).is_none() {
                    errors.push(format!(
                        "schedule.{day}: bad start_time {:?}",
                        event.start_time
                    ));
                }
                if parse_hhmm(&event.end_time).is_none() {
                    errors.push(format!("schedule.{day}: bad end_time {:?}", event.end_time));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PolicyValidationError { errors })
        }
    }
}

/// Parse "HH:MM" into minutes since midnight; "24:00" parses to 1440, the
/// exclusive end of the day.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (hours, minutes) = s.trim().split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if minutes > 59 {
        return None;
    }
    match hours {
        0..=23 => Some(hours * 60 + minutes),
        24 if minutes == 0 => Some(24 * 60),
        _ => None,
    }
}

/// Configuration values that failed policy validation.
#[derive(Debug)]
pub struct PolicyValidationError {
    pub errors: Vec<String>,
}

impl std::fmt::Display for PolicyValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration: {}", self.errors.join("; "))
    }
}

impl std::error::Error for PolicyValidationError {}

/// An error that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {e}"),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return Path::new(&home).join(rest);
    }
    PathBuf::from(path)
}

/// Load configuration from `path`, or search the default locations when none
/// is given. A missing file yields defaults; a present-but-invalid file is an
/// error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let candidates: Vec<PathBuf> = match path {
        Some(path) => vec![path.to_path_buf()],
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(|p| expand_tilde(p))
            .collect(),
    };

    for candidate in candidates {
        match std::fs::read_to_string(&candidate) {
            Ok(contents) => {
                let mut config: Config =
                    toml::from_str(&contents).map_err(ConfigError::Parse)?;
                config.config_path = Some(candidate.clone());
                tracing::info!("loaded config from {}", candidate.display());
                return Ok(config);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ConfigError::Io(e)),
        }
    }

    tracing::info!("no config file found, using defaults");
    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hhmm_accepts_end_of_day() {
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("07:30"), Some(450));
        assert_eq!(parse_hhmm("24:00"), Some(1440));
        assert_eq!(parse_hhmm("24:01"), None);
        assert_eq!(parse_hhmm("7"), None);
        assert_eq!(parse_hhmm("07:60"), None);
    }

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_collects_all_errors() {
        let mut config = Config::default();
        config.scaling.max_crop_percent = 80;
        config.scaling.saliency_threshold = 2.0;
        config.sources.push(SourceConfig {
            kind: SourceType::RemoteAlbum,
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert_eq!(err.errors.len(), 3);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("nope.toml")));
        // An explicitly named but absent file still yields defaults; only a
        // present-but-broken file is an error.
        assert_eq!(config.unwrap(), Config::default());
    }

    #[test]
    fn load_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.sources.push(SourceConfig {
            name: "family".to_string(),
            kind: SourceType::Local,
            path: "/photos/family".to_string(),
            ..Default::default()
        });
        config.display.order = PlaylistOrder::Chronological;
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let mut loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.config_path.take(), Some(path));
        assert_eq!(loaded, config);
    }

    #[test]
    fn caption_selection_respects_priority_and_limit() {
        let overlay = OverlaySettings::default();
        let mut entry = test_entry();
        entry.embedded_caption = Some("from exif".to_string());
        entry.exif_location = Some("Boulder, CO".to_string());
        assert_eq!(overlay.select_caption(&entry).as_deref(), Some("from exif"));

        entry.remote_caption = Some("from album".to_string());
        assert_eq!(
            overlay.select_caption(&entry).as_deref(),
            Some("from album")
        );

        let two = OverlaySettings {
            max_caption_sources: 2,
            ..OverlaySettings::default()
        };
        assert_eq!(
            two.select_caption(&entry).as_deref(),
            Some("from album | from exif")
        );
    }

    #[test]
    fn wants_location_tracks_caption_sources() {
        let overlay = OverlaySettings::default();
        assert!(overlay.wants_location());

        let captions_only = OverlaySettings {
            caption_sources: vec![CaptionSource::RemoteCaption, CaptionSource::EmbeddedCaption],
            ..OverlaySettings::default()
        };
        assert!(!captions_only.wants_location());
    }

    fn test_entry() -> MediaEntry {
        use photoloop_state::{MediaId, MediaKind};
        MediaEntry {
            media_id: MediaId::from_uri("https://a/1"),
            source_type: SourceType::RemoteAlbum,
            uri: "https://a/1".to_string(),
            local_path: PathBuf::from("/tmp/x.jpg"),
            media_kind: MediaKind::Photo,
            album_source: String::new(),
            first_seen: chrono::Local::now(),
            last_seen: chrono::Local::now(),
            content_hash: String::new(),
            file_mtime: None,
            deleted: false,
            remote_caption: None,
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
        }
    }
}
