use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{DisplayParams, MediaKind, SourceType};

/// Identifier for a media item: the first 16 hex characters of the SHA-256
/// digest of its source URI. Deterministic across processes, so the same URI
/// always maps to the same cache filename and catalog key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaId(pub String);

impl MediaId {
    pub fn from_uri(uri: &str) -> Self {
        let digest = Sha256::digest(uri.as_bytes());
        let hex = data_encoding::HEXLOWER.encode(&digest);
        MediaId(hex[..16].to_string())
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// GPS position extracted from embedded metadata, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A detected face, in coordinates normalized to the image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl FaceRegion {
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Bounding box around a set of faces with `margin` added on every side,
/// clamped to the unit square. Returns `(x, y, width, height)`.
pub fn faces_bounding_box(faces: &[FaceRegion], margin: f32) -> Option<(f32, f32, f32, f32)> {
    if faces.is_empty() {
        return None;
    }
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for face in faces {
        min_x = min_x.min(face.x);
        min_y = min_y.min(face.y);
        max_x = max_x.max(face.x + face.width);
        max_y = max_y.max(face.y + face.height);
    }
    let min_x = (min_x - margin).max(0.0);
    let min_y = (min_y - margin).max(0.0);
    let max_x = (max_x + margin).min(1.0);
    let max_y = (max_y + margin).min(1.0);
    Some((min_x, min_y, max_x - min_x, max_y - min_y))
}

/// One catalog record. Created when a source first reports the URI, enriched
/// lazily at display time, tombstoned when a healthy sync stops reporting it,
/// and only ever destroyed by cache-size enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEntry {
    pub media_id: MediaId,
    pub source_type: SourceType,
    /// Absolute location: a web URL for remote items, `file://` for local.
    pub uri: String,
    /// Where the bytes live: the cache-local download for remote items, the
    /// original file for local ones.
    pub local_path: PathBuf,
    pub media_kind: MediaKind,
    /// Label of the source that last reported this item.
    #[serde(default)]
    pub album_source: String,
    pub first_seen: DateTime<Local>,
    pub last_seen: DateTime<Local>,
    /// MD5 of the file contents at indexing time.
    #[serde(default)]
    pub content_hash: String,
    /// Modification time at last index; local items only, used to detect edits.
    #[serde(default)]
    pub file_mtime: Option<DateTime<Local>>,
    #[serde(default)]
    pub deleted: bool,
    /// Caption text the remote album UI exposes for this item.
    #[serde(default)]
    pub remote_caption: Option<String>,
    /// Caption embedded in the file's own metadata.
    #[serde(default)]
    pub embedded_caption: Option<String>,
    /// Location text the remote album UI exposes for this item.
    #[serde(default)]
    pub remote_location: Option<String>,
    /// Reverse-geocoded place name derived from the embedded GPS position.
    #[serde(default)]
    pub exif_location: Option<String>,
    #[serde(default)]
    pub exif_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub remote_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub gps: Option<GpsCoordinates>,
    /// Set once remote caption/location retrieval has been attempted, even
    /// when nothing was found, so failures are not retried forever.
    #[serde(default)]
    pub remote_metadata_fetched: bool,
    #[serde(default)]
    pub cached_faces: Option<Vec<FaceRegion>>,
    #[serde(default)]
    pub display_params: Option<DisplayParams>,
    /// Pre-split single caption from older catalog files; folded into one of
    /// the split caption fields on load.
    #[serde(default, rename = "caption", skip_serializing)]
    pub legacy_caption: Option<String>,
}

impl MediaEntry {
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// Older catalogs stored a single `caption` without recording where it
    /// came from. If remote metadata had been fetched it was almost certainly
    /// the remote caption; otherwise it was read out of the file itself.
    pub fn migrate_legacy_caption(&mut self) {
        if let Some(caption) = self.legacy_caption.take()
            && self.remote_caption.is_none()
            && self.embedded_caption.is_none()
        {
            if self.remote_metadata_fetched {
                self.remote_caption = Some(caption);
            } else {
                self.embedded_caption = Some(caption);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_id_is_deterministic() {
        let a = MediaId::from_uri("https://photos.example/abc");
        let b = MediaId::from_uri("https://photos.example/abc");
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 16);
        assert!(a.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn media_id_distinguishes_uris() {
        let a = MediaId::from_uri("file:///photos/a.jpg");
        let b = MediaId::from_uri("file:///photos/b.jpg");
        assert_ne!(a, b);
    }

    #[test]
    fn bounding_box_covers_all_faces() {
        let faces = vec![
            FaceRegion {
                x: 0.1,
                y: 0.2,
                width: 0.1,
                height: 0.1,
                confidence: 0.9,
            },
            FaceRegion {
                x: 0.6,
                y: 0.5,
                width: 0.2,
                height: 0.2,
                confidence: 0.8,
            },
        ];
        let (x, y, w, h) = faces_bounding_box(&faces, 0.0).unwrap();
        assert!((x - 0.1).abs() < 1e-6);
        assert!((y - 0.2).abs() < 1e-6);
        assert!((w - 0.7).abs() < 1e-6);
        assert!((h - 0.5).abs() < 1e-6);
    }

    #[test]
    fn bounding_box_clamps_margin_to_unit_square() {
        let faces = vec![FaceRegion {
            x: 0.9,
            y: 0.0,
            width: 0.2,
            height: 0.2,
            confidence: 1.0,
        }];
        let (x, y, w, h) = faces_bounding_box(&faces, 0.05).unwrap();
        assert!(x >= 0.0 && y >= 0.0);
        assert!(x + w <= 1.0 + 1e-6);
        assert!(y + h <= 1.0 + 1e-6);
    }
}
