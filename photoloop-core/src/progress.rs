use chrono::{DateTime, Local};
use serde::Serialize;

/// Where the current (or last) sync cycle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    #[default]
    Idle,
    Scraping,
    Downloading,
    FetchingMetadata,
    Complete,
    Error,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Idle => "idle",
            SyncStage::Scraping => "scraping",
            SyncStage::Downloading => "downloading",
            SyncStage::FetchingMetadata => "fetching_metadata",
            SyncStage::Complete => "complete",
            SyncStage::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable sync progress, polled by the web layer. Pure data; every field
/// is assigned by the sync coordinator under the library lock.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncProgress {
    pub is_syncing: bool,
    pub stage: SyncStage,
    /// Source currently being processed.
    pub source_name: String,
    pub sources_done: usize,
    pub sources_total: usize,
    pub items_found: usize,
    pub acquired_done: usize,
    pub acquired_total: usize,
    pub error_message: String,
    pub started_at: Option<DateTime<Local>>,
    pub completed_at: Option<DateTime<Local>>,
}

impl SyncProgress {
    /// Fresh progress for a cycle that just started.
    pub fn starting(sources_total: usize) -> Self {
        SyncProgress {
            is_syncing: true,
            stage: SyncStage::Scraping,
            sources_total,
            started_at: Some(Local::now()),
            ..Default::default()
        }
    }
}
