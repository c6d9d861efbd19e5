use serde::{Deserialize, Serialize};

use crate::{CropBias, FacePosition, FallbackCrop, ScalingMode, SmartCropMethod};

/// Settings that determine which bytes get downloaded. A change here
/// invalidates every stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionFingerprint {
    pub max_dimension: u32,
    pub full_resolution: bool,
}

impl Default for AcquisitionFingerprint {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            full_resolution: true,
        }
    }
}

/// Settings that determine how a crop is computed. A change here invalidates
/// memoized display parameters but not the files or detected faces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingFingerprint {
    pub mode: ScalingMode,
    pub max_crop_percent: u8,
    pub smart_crop_method: SmartCropMethod,
    pub face_position: FacePosition,
    pub fallback_crop: FallbackCrop,
    pub saliency_threshold: f32,
    pub saliency_coverage: f32,
    pub crop_bias: CropBias,
}

impl Default for ScalingFingerprint {
    fn default() -> Self {
        Self {
            mode: ScalingMode::default(),
            max_crop_percent: 15,
            smart_crop_method: SmartCropMethod::default(),
            face_position: FacePosition::default(),
            fallback_crop: FallbackCrop::default(),
            saliency_threshold: 0.3,
            saliency_coverage: 0.9,
            crop_bias: CropBias::default(),
        }
    }
}

/// Settings that determine what the face detector would return. A change here
/// invalidates cached faces, and with them the display parameters built on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionFingerprint {
    pub enabled: bool,
    pub confidence_threshold: f32,
    pub model: String,
}

impl Default for FaceDetectionFingerprint {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.6,
            model: String::new(),
        }
    }
}

/// Canonical summary of every setting that influences a stored artifact,
/// persisted in the catalog header and compared on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SettingsFingerprint {
    pub acquisition: AcquisitionFingerprint,
    pub scaling: ScalingFingerprint,
    pub face_detection: FaceDetectionFingerprint,
}
