//! A renderer that draws nothing. Stands in for the real rasterizer so the
//! engine can run (and be observed through the logs and the control surface)
//! on machines without a display stack.

use std::time::{Duration, Instant};

use photoloop_core::state::{DisplayMode, DisplayParams, MediaEntry, MediaId};
use photoloop_core::Renderer;

const FRAME_INTERVAL: Duration = Duration::from_millis(100);

pub struct HeadlessRenderer {
    resolution: (u32, u32),
    dwell: Duration,
    shown_at: Option<Instant>,
    mode: DisplayMode,
}

impl HeadlessRenderer {
    pub fn new(resolution: (u32, u32), dwell_seconds: u32) -> Self {
        HeadlessRenderer {
            resolution,
            dwell: Duration::from_secs(dwell_seconds as u64),
            shown_at: None,
            mode: DisplayMode::Black,
        }
    }
}

impl Renderer for HeadlessRenderer {
    fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
        if mode != DisplayMode::Slideshow {
            self.shown_at = None;
        }
    }

    fn show(&mut self, entry: &MediaEntry, params: &DisplayParams) {
        tracing::info!(
            "showing {} (crop {:.2},{:.2} {:.2}x{:.2})",
            entry.local_path.display(),
            params.crop_region.x,
            params.crop_region.y,
            params.crop_region.width,
            params.crop_region.height,
        );
        self.shown_at = Some(Instant::now());
    }

    fn is_transition_complete(&self) -> bool {
        true
    }

    fn is_dwell_elapsed(&self) -> bool {
        self.shown_at
            .is_some_and(|shown_at| shown_at.elapsed() >= self.dwell)
    }

    fn skip_next_requested(&mut self) -> bool {
        false
    }

    fn skip_previous_requested(&mut self) -> bool {
        false
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn notify_entry_updated(&mut self, media_id: &MediaId) {
        tracing::debug!("entry updated: {media_id}");
    }

    fn update(&mut self) -> bool {
        std::thread::sleep(FRAME_INTERVAL);
        true
    }
}
