//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (`--config <path>` or the platform `settings.toml`)
//!    and validate it.
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Open the capture device and check for signal.
//! 5. Start the cpal stream feeding the frame queue.
//! 6. Spawn the pipeline orchestrator and the monitor task.
//! 7. Wait for Ctrl-C or a stream fault, then stop capture, stop the tasks
//!    and export the history.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;

use live_ica::{
    audio::{CaptureError, CaptureSource, FrameQueue},
    config::{AppConfig, AudioConfig, SignalPolicy},
    pipeline::{
        run_monitor, wait_for_shutdown, ArchiveSink, LogSink, PipelineOrchestrator, Session, Sink,
    },
    separation::{FastIca, SeparationEngine},
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parse the command line: nothing, or `--config <path>`.
fn config_path_from_args(args: impl IntoIterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut args = args.into_iter();
    match args.next().as_deref() {
        None => Ok(None),
        Some("--config") => match args.next() {
            Some(path) => Ok(Some(PathBuf::from(path))),
            None => bail!("--config requires a path"),
        },
        Some(other) => bail!("unrecognised argument {other:?} (usage: live-ica [--config <path>])"),
    }
}

fn load_config() -> Result<AppConfig> {
    let config = match config_path_from_args(std::env::args().skip(1))? {
        Some(path) => {
            log::info!("loading configuration from {}", path.display());
            AppConfig::load_from(&path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => AppConfig::load().context("failed to load settings.toml")?,
    };
    config.validate()?;
    Ok(config)
}

/// Memory one history entry holds: the window plus the separated components.
fn history_bytes_per_cycle(audio: &AudioConfig) -> usize {
    let window = audio.window_size * audio.channels as usize;
    let separated = audio.window_size * audio.n_components;
    (window + separated) * std::mem::size_of::<f64>()
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

/// Spawn the pipeline and monitor tasks, wait for a stop request, then wind
/// everything down.  Returns the archive path, if one was written.
async fn run(
    config: &AppConfig,
    capture: &mut CaptureSource,
    session: Arc<Session>,
    queue: Arc<FrameQueue>,
    sink: Box<dyn Sink>,
) -> Result<Option<PathBuf>> {
    let engine: Arc<dyn SeparationEngine> =
        Arc::new(FastIca::new(config.audio.n_components, &config.separation));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown = Arc::new(shutdown_tx);
    let mut stop = shutdown.subscribe();

    let orchestrator = PipelineOrchestrator::new(
        config,
        Arc::clone(&queue),
        engine,
        sink,
        Arc::clone(&session),
    )?;
    let pipeline = tokio::spawn(orchestrator.run(shutdown_rx));
    let monitor = tokio::spawn(run_monitor(
        Arc::clone(&session),
        Arc::clone(&queue),
        config.audio.monitoring_interval(),
        Arc::clone(&shutdown),
    ));

    tokio::select! {
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => log::info!("interrupt received, shutting down"),
            Err(e) => log::error!("failed to listen for Ctrl-C ({e}), shutting down"),
        },
        _ = wait_for_shutdown(&mut stop) => log::info!("shutdown requested by monitor"),
    }

    session.stop();
    capture.stop();
    shutdown.send_replace(true);

    if let Err(e) = monitor.await {
        log::warn!("monitor task ended abnormally: {e}");
    }
    let archive = pipeline.await.context("pipeline task panicked")??;

    log::info!("final statistics: {}", session.stats());
    Ok(archive)
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("live-ica starting up");

    // 2. Configuration
    let config = load_config()?;
    let audio = &config.audio;
    log::info!(
        "device filter {:?}, {} Hz, {} ch, block {}, window {}, queue {}",
        audio.device_name,
        audio.sample_rate,
        audio.channels,
        audio.buffer_size,
        audio.window_size,
        audio.queue_size
    );
    if audio.cadence_ratio() < 1.0 {
        log::warn!(
            "analysis tick ({:?}) is slower than the capture block period ({:?}); \
             the queue will fill and frames will be dropped",
            audio.update_interval(),
            audio.block_period()
        );
    }

    if config.export.history_limit.is_none() {
        log::info!(
            "history is unbounded (about {} KiB per cycle); set [export] history_limit for long runs",
            history_bytes_per_cycle(audio) / 1024
        );
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Capture device + signal check
    let mut capture = CaptureSource::open(audio)?;
    match capture.verify_signal() {
        Ok(peak) => log::info!("signal detected on {:?} (peak {peak:.4})", capture.device_name()),
        Err(e @ CaptureError::SignalNotDetected { .. }) => match audio.signal_policy {
            SignalPolicy::Fatal => return Err(e.into()),
            SignalPolicy::Warn => log::warn!("{e}; continuing"),
        },
        Err(e) => return Err(e.into()),
    }

    // 5. Continuous capture
    let session = Session::new();
    let queue = Arc::new(FrameQueue::new(audio.queue_size));
    capture.start(
        session.frame_handler(queue.producer()),
        session.error_handler(),
    )?;

    // 6-7. Pipeline
    let sink: Box<dyn Sink> = if config.export.enabled {
        Box::new(ArchiveSink::new(LogSink, config.export.resolved_output_dir()))
    } else {
        Box::new(LogSink)
    };

    let result = rt.block_on(run(&config, &mut capture, session, queue, sink));
    capture.stop();

    match result? {
        Some(path) => log::info!("history saved to {}", path.display()),
        None => log::info!("no history saved"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
