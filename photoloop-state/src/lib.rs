//! Core data model for PhotoLoop: the media catalog, its entries, and the
//! settings fingerprint that decides when cached artifacts must be discarded.
//!
//! Separated out so that sources, configuration, and the engine can all share
//! the same vocabulary without depending on each other.

mod catalog;
mod display_params;
mod entry;
mod fingerprint;
mod policy;

pub use catalog::{Catalog, MediaCounts, CATALOG_FILE_NAME};
pub use display_params::{CropRegion, DisplayParams, KenBurnsAnimation};
pub use entry::{faces_bounding_box, FaceRegion, GpsCoordinates, MediaEntry, MediaId};
pub use fingerprint::{
    AcquisitionFingerprint, FaceDetectionFingerprint, ScalingFingerprint, SettingsFingerprint,
};
pub use policy::{
    CropBias, DisplayMode, FacePosition, FallbackCrop, MediaKind, PlaylistOrder, ScalingMode,
    SmartCropMethod, SourceType,
};
