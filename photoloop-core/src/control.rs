//! Control-surface operations consumed by the external web layer: status,
//! source management, sync triggers, and playback/schedule controls. No HTTP
//! here; the web layer maps routes onto these calls.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use photoloop_shared::{load_config, SourceConfig};
use photoloop_state::{DisplayMode, MediaCounts, MediaId, MediaKind, SourceType};

use crate::{
    library::MediaLibrary,
    orchestrator::PlaybackCommands,
    progress::SyncProgress,
    schedule::{ScheduleStatus, Scheduler},
    sync::SyncOptions,
};

/// Actions the control surface accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    ForceSlideshow,
    ForceClock,
    ForceBlack,
    ClearOverride,
    Next,
    Previous,
    Pause,
    Resume,
    ReloadConfig,
}

/// An error from a control operation.
#[derive(Debug)]
pub enum ControlError {
    /// A source index that does not exist.
    IndexOutOfRange(usize),
    /// A source descriptor missing its url or path.
    InvalidSource(String),
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::IndexOutOfRange(index) => {
                write!(f, "source index {index} out of range")
            }
            ControlError::InvalidSource(message) => write!(f, "invalid source: {message}"),
        }
    }
}

impl std::error::Error for ControlError {}

/// Full status snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub display_mode: DisplayMode,
    pub paused: bool,
    pub counts: MediaCounts,
    pub cache_size_mb: f64,
    pub schedule: ScheduleStatus,
    pub sync: SyncProgress,
}

/// One configured source plus its last successful sync time.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub index: usize,
    pub name: String,
    pub kind: SourceType,
    pub url: String,
    pub path: String,
    pub enabled: bool,
    pub last_sync: Option<DateTime<Local>>,
}

/// One catalog item, trimmed for listing.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSummary {
    pub media_id: MediaId,
    pub kind: MediaKind,
    pub remote_caption: Option<String>,
    pub embedded_caption: Option<String>,
    pub exif_date: Option<NaiveDateTime>,
    pub local_path: String,
}

pub struct Controller {
    library: Arc<MediaLibrary>,
    scheduler: Arc<Scheduler>,
    commands: Arc<PlaybackCommands>,
}

impl Controller {
    pub fn new(
        library: Arc<MediaLibrary>,
        scheduler: Arc<Scheduler>,
        commands: Arc<PlaybackCommands>,
    ) -> Self {
        Controller {
            library,
            scheduler,
            commands,
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            display_mode: self.scheduler.display_mode_now(),
            paused: self.commands.is_paused(),
            counts: self.library.media_counts(),
            cache_size_mb: self.library.cache_size_bytes() as f64 / 1024.0 / 1024.0,
            schedule: self.scheduler.status(Local::now().naive_local()),
            sync: self.library.sync_progress(),
        }
    }

    pub fn list_sources(&self) -> Vec<SourceSummary> {
        let sync_times = self.library.source_sync_times();
        let config = self.library.config.read().unwrap();
        config
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| SourceSummary {
                index,
                name: source.name.clone(),
                kind: source.kind,
                url: source.url.clone(),
                path: source.path.clone(),
                enabled: source.enabled,
                last_sync: sync_times.get(&source.label()).copied(),
            })
            .collect()
    }

    pub fn add_source(&self, source: SourceConfig) -> Result<(), ControlError> {
        if !source.is_usable() {
            return Err(ControlError::InvalidSource(match source.kind {
                SourceType::RemoteAlbum => "remote album needs a url".to_string(),
                SourceType::Local => "local source needs a path".to_string(),
            }));
        }
        {
            let mut config = self.library.config.write().unwrap();
            config.sources.push(source);
        }
        self.library.rebuild_playlist();
        Ok(())
    }

    pub fn remove_source(&self, index: usize) -> Result<(), ControlError> {
        {
            let mut config = self.library.config.write().unwrap();
            if index >= config.sources.len() {
                return Err(ControlError::IndexOutOfRange(index));
            }
            config.sources.remove(index);
        }
        self.library.rebuild_playlist();
        Ok(())
    }

    pub fn set_source_enabled(&self, index: usize, enabled: bool) -> Result<(), ControlError> {
        {
            let mut config = self.library.config.write().unwrap();
            let source = config
                .sources
                .get_mut(index)
                .ok_or(ControlError::IndexOutOfRange(index))?;
            source.enabled = enabled;
        }
        self.library.rebuild_playlist();
        Ok(())
    }

    pub fn set_source_name(&self, index: usize, name: &str) -> Result<(), ControlError> {
        {
            let mut config = self.library.config.write().unwrap();
            let source = config
                .sources
                .get_mut(index)
                .ok_or(ControlError::IndexOutOfRange(index))?;
            source.name = name.to_string();
        }
        self.library.rebuild_playlist();
        Ok(())
    }

    /// Kick off a sync in the background. A cycle already in progress makes
    /// this a no-op (the coordinator drops the duplicate request).
    pub fn start_sync(&self, options: SyncOptions) {
        let library = self.library.clone();
        std::thread::spawn(move || {
            library.sync(&options);
        });
    }

    pub fn control(&self, action: ControlAction) {
        tracing::info!("control request: {action:?}");
        match action {
            ControlAction::ForceSlideshow => self.scheduler.force_mode(DisplayMode::Slideshow),
            ControlAction::ForceClock => self.scheduler.force_mode(DisplayMode::Clock),
            ControlAction::ForceBlack => self.scheduler.force_mode(DisplayMode::Black),
            ControlAction::ClearOverride => self.scheduler.clear_override(),
            ControlAction::Next => self.commands.request_next(),
            ControlAction::Previous => self.commands.request_previous(),
            ControlAction::Pause => self.commands.set_paused(true),
            ControlAction::Resume => self.commands.set_paused(false),
            ControlAction::ReloadConfig => self.reload_config(),
        }
    }

    pub fn list_items(&self) -> Vec<ItemSummary> {
        self.library
            .all_media()
            .into_iter()
            .map(|entry| ItemSummary {
                media_id: entry.media_id,
                kind: entry.media_kind,
                remote_caption: entry.remote_caption,
                embedded_caption: entry.embedded_caption,
                exif_date: entry.exif_date,
                local_path: entry.local_path.display().to_string(),
            })
            .collect()
    }

    /// Re-read the config file and rebuild the playlist so source and
    /// ordering changes take effect.
    fn reload_config(&self) {
        let path = self.library.config.read().unwrap().config_path.clone();
        match load_config(path.as_deref()) {
            Ok(new_config) => {
                *self.library.config.write().unwrap() = new_config;
                self.library.rebuild_playlist();
                tracing::info!("configuration reloaded");
            }
            Err(e) => tracing::error!("failed to reload config: {e}"),
        }
    }
}
