//! Configuration types shared between the engine and the binary.

mod config;

pub use config::{
    load_config, parse_hhmm, CacheSettings, CaptionSource, Config, ConfigError, DisplaySettings,
    HolidaySettings, KenBurnsSettings, OverlaySettings, PolicyValidationError, ScalingSettings,
    ScheduleEvent, ScheduleSettings, SourceConfig, SyncSettings, WebSettings,
    DEFAULT_CONFIG_PATHS, FACE_DETECTOR_MODEL,
};
