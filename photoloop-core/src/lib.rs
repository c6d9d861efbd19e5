//! The PhotoLoop engine: media library, sync coordination, playlist ordering,
//! display-parameter computation, scheduling, and the lifecycle that ties them
//! to a renderer.

pub mod collaborators;
pub mod control;
pub mod geocode;
pub mod holiday;
pub mod orchestrator;
pub mod playlist;
pub mod processor;
pub mod progress;
pub mod schedule;

mod annotate;
mod library;
mod sync;

pub use collaborators::{
    AestheticCropper, AnnotatorError, FaceDetector, GeocodedPlace, HolidayCalendar,
    MetadataExtractor, NoopMetadataExtractor, PhotoMetadata, Renderer, ReverseGeocoder,
    SaliencyDetector, SaliencyMap,
};
pub use control::{ControlAction, ControlError, Controller, ItemSummary, SourceSummary};
pub use geocode::GeocodeService;
pub use holiday::BuiltinHolidays;
pub use library::{LibraryArgs, MediaLibrary};
pub use orchestrator::{Orchestrator, PlaybackCommands, ShutdownEvent, TickState};
pub use playlist::{Playlist, RecencyPolicy};
pub use processor::ImageProcessor;
pub use progress::{SyncProgress, SyncStage};
pub use schedule::{ScheduleStatus, Scheduler};
pub use sync::{SyncOptions, SyncStats};

pub use photoloop_shared as shared;
pub use photoloop_sources as sources;
pub use photoloop_state as state;
