//! Contracts for the external collaborators the engine drives but does not
//! implement: the rasterizing renderer, the ML detectors, embedded-metadata
//! extraction, and reverse geocoding.
//!
//! These are injected as trait objects. The detectors are optional at
//! runtime; their absence is a normal condition that degrades the dependent
//! feature, never an initialization failure.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use photoloop_state::{
    CropRegion, DisplayMode, DisplayParams, FaceRegion, GpsCoordinates, MediaEntry, MediaId,
};

/// A failure inside an optional annotator component. Callers fall back to a
/// safe default (centered crop, no location) rather than propagating it.
#[derive(Debug)]
pub struct AnnotatorError {
    pub message: String,
}

impl AnnotatorError {
    pub fn new(message: impl Into<String>) -> Self {
        AnnotatorError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AnnotatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AnnotatorError {}

/// Everything the engine needs from the display. The renderer is owned
/// exclusively by the display thread and is not thread-safe; background work
/// reaches it only through the orchestrator.
pub trait Renderer {
    /// Switch between slideshow, clock, and black.
    fn set_mode(&mut self, mode: DisplayMode);
    /// Hand over the next item together with its display parameters and start
    /// the dwell timer.
    fn show(&mut self, entry: &MediaEntry, params: &DisplayParams);
    fn is_transition_complete(&self) -> bool;
    fn is_dwell_elapsed(&self) -> bool;
    /// True once if the user asked to skip forward; consumes the request.
    fn skip_next_requested(&mut self) -> bool;
    /// True once if the user asked to skip backward; consumes the request.
    fn skip_previous_requested(&mut self) -> bool;
    fn resolution(&self) -> (u32, u32);
    /// An entry's annotations changed (e.g. a location arrived); redraw its
    /// overlay if it is on screen.
    fn notify_entry_updated(&mut self, media_id: &MediaId);
    /// Pump events and draw one frame. Returns false when the renderer wants
    /// the application to exit.
    fn update(&mut self) -> bool;
}

/// Detects faces in an image file, returning normalized regions.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image_path: &Path) -> Result<Vec<FaceRegion>, AnnotatorError>;
}

/// A dense per-pixel importance map produced by the saliency detector.
#[derive(Debug, Clone)]
pub struct SaliencyMap {
    pub width: usize,
    pub height: usize,
    /// Row-major values, `width * height` of them.
    pub values: Vec<f32>,
}

impl SaliencyMap {
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }
}

pub trait SaliencyDetector: Send + Sync {
    fn saliency_map(&self, image_path: &Path) -> Result<SaliencyMap, AnnotatorError>;
}

/// Proposes an aesthetically scored crop at a target aspect ratio.
pub trait AestheticCropper: Send + Sync {
    fn best_crop(
        &self,
        image_path: &Path,
        target_aspect: f32,
    ) -> Result<Option<CropRegion>, AnnotatorError>;
}

/// Semantic outputs of embedded-metadata extraction. The byte-level parsing
/// of EXIF/IPTC/XMP lives outside the engine.
#[derive(Debug, Clone, Default)]
pub struct PhotoMetadata {
    pub date_taken: Option<NaiveDateTime>,
    pub caption: Option<String>,
    pub gps: Option<GpsCoordinates>,
    pub dimensions: Option<(u32, u32)>,
}

pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, image_path: &Path) -> Result<PhotoMetadata, AnnotatorError>;
}

/// Extractor used when no metadata component is wired up. Entries are still
/// created, just without embedded dates, captions, or GPS.
pub struct NoopMetadataExtractor;

impl MetadataExtractor for NoopMetadataExtractor {
    fn extract(&self, _image_path: &Path) -> Result<PhotoMetadata, AnnotatorError> {
        Ok(PhotoMetadata::default())
    }
}

/// A reverse-geocoded place, structured so the formatting policy can live in
/// the engine.
#[derive(Debug, Clone, Default)]
pub struct GeocodedPlace {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    /// ISO 3166-1 alpha-2, uppercase.
    pub country_code: Option<String>,
}

/// Coordinate-to-place lookup. The engine rate-limits calls to at most one
/// per wall-clock second; implementations need no throttling of their own.
pub trait ReverseGeocoder: Send + Sync {
    fn reverse(&self, latitude: f64, longitude: f64)
        -> Result<Option<GeocodedPlace>, AnnotatorError>;
}

/// Answers "is this date a public holiday in this country".
pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate, country: &str) -> bool;
}
