//! The lifecycle orchestrator: the per-tick decision loop that turns schedule
//! state and the catalog into the next item for the renderer, plus the
//! background sync thread and cooperative shutdown.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
        Arc, Condvar, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

use chrono::{Local, NaiveTime};

use photoloop_state::{DisplayMode, MediaId};

use crate::{
    collaborators::Renderer, library::MediaLibrary, schedule::Scheduler, sync::SyncOptions,
};

/// Delay before the optional sync-on-start, giving the rest of the system a
/// moment to come up.
const SYNC_ON_START_DELAY: Duration = Duration::from_secs(30);

/// A settable event other threads can wait on with a timeout, in the manner
/// of a classic threading event: `wait_timeout` returns true once signaled.
pub struct ShutdownEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownEvent {
    pub fn new() -> Self {
        ShutdownEvent {
            signaled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn signal(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        *signaled = true;
        self.condvar.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock().unwrap()
    }

    /// Wait up to `timeout`; returns true if the event was signaled, false on
    /// timeout. Used for interruptible inter-cycle sleeps.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock().unwrap();
        let deadline = std::time::Instant::now() + timeout;
        while !*signaled {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(signaled, deadline - now)
                .unwrap();
            signaled = guard;
        }
        true
    }
}

impl Default for ShutdownEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-thread playback requests from the control surface, drained by the
/// tick loop on the display thread.
#[derive(Default)]
pub struct PlaybackCommands {
    skip_next: AtomicBool,
    skip_previous: AtomicBool,
    paused: AtomicBool,
}

impl PlaybackCommands {
    pub fn request_next(&self) {
        self.skip_next.store(true, Ordering::SeqCst);
    }

    pub fn request_previous(&self) {
        self.skip_previous.store(true, Ordering::SeqCst);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn take_next(&self) -> bool {
        self.skip_next.swap(false, Ordering::SeqCst)
    }

    fn take_previous(&self) -> bool {
        self.skip_previous.swap(false, Ordering::SeqCst)
    }
}

/// Mutable state the tick loop carries between ticks.
#[derive(Default)]
pub struct TickState {
    last_mode: Option<DisplayMode>,
    current: Option<MediaId>,
}

pub struct Orchestrator {
    library: Arc<MediaLibrary>,
    scheduler: Arc<Scheduler>,
    commands: Arc<PlaybackCommands>,
    shutdown: Arc<ShutdownEvent>,
    entry_updated_tx: Sender<MediaId>,
    entry_updated_rx: Receiver<MediaId>,
}

impl Orchestrator {
    pub fn new(library: Arc<MediaLibrary>, scheduler: Arc<Scheduler>) -> Self {
        let (entry_updated_tx, entry_updated_rx) = std::sync::mpsc::channel();
        Orchestrator {
            library,
            scheduler,
            commands: Arc::new(PlaybackCommands::default()),
            shutdown: Arc::new(ShutdownEvent::new()),
            entry_updated_tx,
            entry_updated_rx,
        }
    }

    pub fn commands(&self) -> Arc<PlaybackCommands> {
        self.commands.clone()
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownEvent> {
        self.shutdown.clone()
    }

    /// Run the display loop until shutdown or renderer exit. This thread owns
    /// the renderer; nothing else may touch it.
    pub fn run(&self, renderer: &mut dyn Renderer) {
        let mut tick_state = TickState::default();
        while !self.shutdown.is_signaled() {
            if !self.tick(renderer, &mut tick_state) {
                tracing::info!("renderer requested exit");
                break;
            }
        }
    }

    /// One pass of the display loop. Returns false when the renderer asks to
    /// exit.
    pub fn tick(&self, renderer: &mut dyn Renderer, tick_state: &mut TickState) -> bool {
        // Background annotations that completed since last tick.
        for id in self.entry_updated_rx.try_iter() {
            renderer.notify_entry_updated(&id);
        }

        let mut mode = self.scheduler.display_mode_now();
        if !self.library.has_enabled_sources() {
            mode = DisplayMode::Black;
        }

        if tick_state.last_mode != Some(mode) {
            tracing::info!("display mode changed: {mode}");
            renderer.set_mode(mode);
            tick_state.last_mode = Some(mode);
        }

        if mode == DisplayMode::Slideshow {
            if !self.commands.is_paused() {
                self.advance_if_due(renderer, tick_state);
            }
        } else {
            // Reset so the slideshow starts fresh when it resumes.
            tick_state.current = None;
        }

        renderer.update()
    }

    fn advance_if_due(&self, renderer: &mut dyn Renderer, tick_state: &mut TickState) {
        let skip_next = self.commands.take_next() || renderer.skip_next_requested();
        let skip_previous = self.commands.take_previous() || renderer.skip_previous_requested();

        let due = tick_state.current.is_none()
            || skip_next
            || skip_previous
            || (renderer.is_dwell_elapsed() && renderer.is_transition_complete());
        if !due {
            return;
        }

        let entry = if skip_previous {
            self.library.previous_media()
        } else {
            self.library.next_media()
        };
        let Some(entry) = entry else {
            if tick_state.current.is_none() {
                tracing::warn!("no media available to display");
            }
            return;
        };

        let resolution = renderer.resolution();
        let Some(params) = self.library.display_params(&entry.media_id, resolution) else {
            return;
        };
        self.library
            .spawn_geocode_if_needed(&entry.media_id, self.entry_updated_tx.clone());

        tracing::info!(
            "displaying {}",
            entry
                .local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.media_id.to_string())
        );
        renderer.show(&entry, &params);
        tick_state.current = Some(entry.media_id);
    }

    /// Start the background sync thread, which sleeps between cycles and
    /// wakes early on shutdown. Returns `None` when automatic sync is
    /// disabled.
    pub fn spawn_sync_thread(&self) -> Option<JoinHandle<()>> {
        let (interval_minutes, sync_on_start, sync_time) = {
            let config = self.library.config.read().unwrap();
            (
                config.sync.interval_minutes,
                config.sync.sync_on_start,
                config.sync.sync_time.clone(),
            )
        };
        if interval_minutes == 0 {
            tracing::info!("automatic sync disabled (interval 0)");
            return None;
        }

        let library = self.library.clone();
        let shutdown = self.shutdown.clone();
        let handle = std::thread::spawn(move || {
            let interval = Duration::from_secs(interval_minutes as u64 * 60);

            if sync_on_start {
                tracing::info!("sync on start enabled, syncing shortly");
                if shutdown.wait_timeout(SYNC_ON_START_DELAY) {
                    return;
                }
                library.sync(&SyncOptions::default());
            }

            // Anchor the first scheduled cycle to the configured wall-clock
            // time, or fall back to one full interval.
            if let Some(sync_time) = sync_time.as_deref() {
                if let Some(wait) = seconds_until(sync_time) {
                    tracing::info!("first scheduled sync at {sync_time}");
                    if shutdown.wait_timeout(wait) {
                        return;
                    }
                } else {
                    tracing::warn!("invalid sync_time {sync_time:?}, expected HH:MM");
                }
            } else if !sync_on_start && shutdown.wait_timeout(interval) {
                return;
            }

            loop {
                if shutdown.is_signaled() {
                    break;
                }
                tracing::info!("starting scheduled sync");
                library.sync(&SyncOptions::default());
                if shutdown.wait_timeout(interval) {
                    break;
                }
            }
        });
        tracing::info!(
            "sync thread started (interval: {} minutes)",
            interval_minutes
        );
        Some(handle)
    }
}

/// Time until the next occurrence of `time_str` ("HH:MM"), today or tomorrow.
fn seconds_until(time_str: &str) -> Option<Duration> {
    let target = NaiveTime::parse_from_str(time_str, "%H:%M").ok()?;
    let now = Local::now().naive_local();
    let mut target_dt = now.date().and_time(target);
    if target_dt <= now {
        target_dt += chrono::Duration::days(1);
    }
    let seconds = (target_dt - now).num_seconds().max(0) as u64;
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_event_wakes_waiters() {
        let event = Arc::new(ShutdownEvent::new());
        assert!(!event.wait_timeout(Duration::from_millis(10)));

        let waiter = {
            let event = event.clone();
            std::thread::spawn(move || event.wait_timeout(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(20));
        event.signal();
        assert!(waiter.join().unwrap());
        assert!(event.is_signaled());
        // Once signaled, waits return immediately.
        assert!(event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn playback_commands_are_consumed_once() {
        let commands = PlaybackCommands::default();
        commands.request_next();
        assert!(commands.take_next());
        assert!(!commands.take_next());

        commands.set_paused(true);
        assert!(commands.is_paused());
        commands.set_paused(false);
        assert!(!commands.is_paused());
    }

    #[test]
    fn seconds_until_is_within_a_day() {
        let duration = seconds_until("03:30").unwrap();
        assert!(duration <= Duration::from_secs(24 * 60 * 60));
        assert!(seconds_until("not a time").is_none());
    }
}
