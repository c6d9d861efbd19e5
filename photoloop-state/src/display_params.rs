use serde::{Deserialize, Serialize};

/// A crop region in coordinates normalized to the source image, so the same
/// parameters apply regardless of the decoded resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRegion {
    /// The whole image, uncropped.
    pub const FULL: CropRegion = CropRegion {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Slow zoom-and-pan animation parameters. All coordinates normalized;
/// a zoom of 1.0 shows the full crop region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KenBurnsAnimation {
    pub start_zoom: f32,
    pub end_zoom: f32,
    pub start_center: (f32, f32),
    pub end_center: (f32, f32),
}

/// Pre-computed display parameters for one entry at one screen resolution,
/// memoized on the catalog entry to avoid recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayParams {
    pub screen_resolution: (u32, u32),
    pub crop_region: CropRegion,
    #[serde(default)]
    pub ken_burns: Option<KenBurnsAnimation>,
}

impl DisplayParams {
    /// A centered, uncropped, unanimated rendition; the safe answer for
    /// unreadable images.
    pub fn full_frame(screen_resolution: (u32, u32)) -> Self {
        DisplayParams {
            screen_resolution,
            crop_region: CropRegion::FULL,
            ken_burns: None,
        }
    }
}
