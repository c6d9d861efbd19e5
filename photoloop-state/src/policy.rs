use serde::{Deserialize, Serialize};

/// Where a media item originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A public web album, enumerated by the album inspector.
    #[default]
    RemoteAlbum,
    /// A directory on the local filesystem.
    Local,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::RemoteAlbum => "remote_album",
            SourceType::Local => "local",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an item is a still photo or a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the source image is mapped onto the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    /// Fill the screen, cropping the excess.
    #[default]
    Fill,
    /// Show the whole image, letter-/pillar-boxing the remainder.
    Fit,
    /// Crop up to `max_crop_percent`, then box whatever is left over.
    Balanced,
    /// Resize without preserving the aspect ratio.
    Stretch,
}

/// Which algorithm positions the crop within the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmartCropMethod {
    /// Keep detected faces in frame.
    #[default]
    Face,
    /// Maximize coverage of the saliency map.
    Saliency,
    /// Ask the aesthetic cropper for its best candidate.
    Aesthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FacePosition {
    #[default]
    Center,
    RuleOfThirds,
    TopThird,
}

/// Vertical placement used when no faces or salient regions are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCrop {
    #[default]
    Center,
    Top,
    Bottom,
}

/// Which edge of the image to preserve when cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CropBias {
    #[default]
    None,
    Top,
    Bottom,
}

/// Ordering policy for the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistOrder {
    #[default]
    Random,
    RecencyWeighted,
    Alphabetical,
    Chronological,
}

impl PlaylistOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistOrder::Random => "random",
            PlaylistOrder::RecencyWeighted => "recency_weighted",
            PlaylistOrder::Alphabetical => "alphabetical",
            PlaylistOrder::Chronological => "chronological",
        }
    }
}

/// What the frame should be showing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Slideshow,
    Clock,
    Black,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Slideshow => "slideshow",
            DisplayMode::Clock => "clock",
            DisplayMode::Black => "black",
        }
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
