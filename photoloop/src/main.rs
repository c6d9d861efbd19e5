mod headless;

use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use headless::HeadlessRenderer;
use photoloop_core::{
    BuiltinHolidays, LibraryArgs, MediaLibrary, NoopMetadataExtractor, Orchestrator, Scheduler,
    SyncOptions,
};
use photoloop_sources::{HttpFetcher, UnavailableInspector};

/// Digital photo frame: syncs web albums and local directories into a local
/// cache and drives a scheduled slideshow.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "photoloop=debug"
    } else {
        "photoloop=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = photoloop_shared::load_config(args.config.as_deref())?;
    if let Err(e) = config.validate() {
        for error in &e.errors {
            tracing::warn!("config: {error}");
        }
    }
    let photo_duration = config.display.photo_duration_seconds;
    let config = Arc::new(RwLock::new(config));

    let library = Arc::new(MediaLibrary::new(LibraryArgs {
        config: config.clone(),
        // The browser-backed album inspector, the ML detectors, and the
        // metadata parser are external components; without them remote
        // sources report per-source errors and crops fall back to the
        // configured defaults.
        inspector: Arc::new(UnavailableInspector),
        fetcher: Arc::new(HttpFetcher::new()),
        metadata: Arc::new(NoopMetadataExtractor),
        face_detector: None,
        saliency: None,
        aesthetic: None,
        geocoder: None,
    }));

    let counts = library.media_counts();
    tracing::info!(
        "cache contains {} photos, {} videos ({:.1} MB)",
        counts.photos,
        counts.videos,
        library.cache_size_bytes() as f64 / 1024.0 / 1024.0
    );

    let scheduler = Arc::new(Scheduler::new(config.clone(), Arc::new(BuiltinHolidays)));
    let orchestrator = Orchestrator::new(library.clone(), scheduler);
    let shutdown = orchestrator.shutdown_handle();

    let sync_thread = orchestrator.spawn_sync_thread();

    // With nothing cached yet, block on one sync so there is something to
    // show.
    if counts.total == 0 && library.has_enabled_sources() {
        tracing::info!("no cached media, performing initial sync");
        library.sync(&SyncOptions::default());
    }

    let mut renderer = HeadlessRenderer::new((1920, 1080), photo_duration);
    tracing::info!("photoloop started");
    orchestrator.run(&mut renderer);

    shutdown.signal();
    if let Some(handle) = sync_thread {
        let _ = handle.join();
    }
    library.save_geocode_cache();
    tracing::info!("photoloop stopped");
    Ok(())
}
