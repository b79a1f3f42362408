//! Pipeline orchestrator: drives the periodic analysis loop.
//!
//! [`PipelineOrchestrator`] owns the consumer side of the [`FrameQueue`], the
//! separation engine, the sink and the run history.  Every tick of
//! `update_interval` it runs one cycle:
//!
//! ```text
//! tick
//!   └─▶ try_dequeue ── empty ──▶ (nothing)
//!         └─▶ build window ── short frame ──▶ skip
//!               └─▶ spawn_blocking(engine.separate) ── Err ──▶ skip
//!                     └─▶ metrics(component 0, component 1) ── Err ──▶ skip
//!                           └─▶ sink.present, history.push
//! ```
//!
//! A cycle runs to completion before the next tick is taken, and ticks that
//! fall due meanwhile are skipped rather than queued.  On shutdown the queue
//! is discarded and the history is handed to [`Sink::export`].
//!
//! [`run_monitor`] is the companion task that logs queue and session
//! statistics and requests shutdown after a stream fault.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::audio::{FrameQueue, WindowBuilder};
use crate::config::{AppConfig, ConfigError, MIN_TIMER_PERIOD};
use crate::metrics::{self, MetricError};
use crate::separation::{SeparationEngine, SeparationError};

use super::session::Session;
use super::sink::{CycleOutput, History, HistoryEntry, Sink};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Why a cycle was skipped.  None of these stop the loop.
#[derive(Debug)]
pub enum PipelineError {
    /// The dequeued frame was shorter than the analysis window.
    InsufficientData { available: usize, required: usize },
    /// The engine rejected the window.
    Separation(SeparationError),
    /// The engine produced fewer than two components.
    TooFewComponents(usize),
    /// Metric evaluation failed.
    Metrics(MetricError),
    /// Internal / unexpected error (e.g. tokio join failure).
    Internal(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::InsufficientData {
                available,
                required,
            } => write!(
                f,
                "insufficient data: {available} samples per channel, window needs {required}"
            ),
            PipelineError::Separation(e) => write!(f, "separation failed: {e}"),
            PipelineError::TooFewComponents(n) => {
                write!(f, "engine returned {n} component(s), metrics need 2")
            }
            PipelineError::Metrics(e) => write!(f, "metrics failed: {e}"),
            PipelineError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Periodic, single-flight analysis loop.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use live_ica::audio::FrameQueue;
/// use live_ica::config::AppConfig;
/// use live_ica::pipeline::{LogSink, PipelineOrchestrator, Session};
/// use live_ica::separation::FastIca;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = AppConfig::default();
/// let queue = Arc::new(FrameQueue::new(config.audio.queue_size));
/// let engine = Arc::new(FastIca::new(config.audio.n_components, &config.separation));
///
/// let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
/// let orchestrator =
///     PipelineOrchestrator::new(&config, queue, engine, Box::new(LogSink), Session::new())?;
/// let task = tokio::spawn(orchestrator.run(shutdown_rx));
///
/// // ... later
/// shutdown_tx.send_replace(true);
/// let archive = task.await??;
/// # Ok(())
/// # }
/// ```
pub struct PipelineOrchestrator {
    queue: Arc<FrameQueue>,
    windows: WindowBuilder,
    engine: Arc<dyn SeparationEngine>,
    sink: Box<dyn Sink>,
    session: Arc<Session>,
    history: History,
    update_interval: Duration,
    next_cycle: u64,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `config`: validated configuration (window size, tick interval,
    ///   history limit).
    /// * `queue`: consumer side of the capture queue.
    /// * `engine`: separation engine (e.g. `FastIca`).
    /// * `sink`: receives each cycle's output and the final history.
    /// * `session`: shared counters.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`AppConfig::validate`]; a zero window
    /// or tick never reaches the loop.
    pub fn new(
        config: &AppConfig,
        queue: Arc<FrameQueue>,
        engine: Arc<dyn SeparationEngine>,
        sink: Box<dyn Sink>,
        session: Arc<Session>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            queue,
            windows: WindowBuilder::new(config.audio.window_size),
            engine,
            sink,
            session,
            history: History::new(config.export.history_limit),
            update_interval: config.audio.update_interval(),
            next_cycle: 0,
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until `shutdown` becomes `true` (or its sender is dropped), then
    /// discard queued frames and export the history.
    ///
    /// Returns the archive path written by the sink, if any.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Option<PathBuf>> {
        let mut ticker = tokio::time::interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "pipeline: analysis loop started (tick {:?}, window {})",
            self.update_interval,
            self.windows.window_size()
        );

        loop {
            let stop_requested = *shutdown.borrow();
            if stop_requested || !self.session.is_running() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        log::debug!("pipeline: shutdown sender dropped");
                        break;
                    }
                }
            }
        }

        self.finish()
    }

    /// One tick: run a cycle and book-keep its outcome.
    async fn tick(&mut self) {
        match self.run_cycle().await {
            Ok(Some(_)) => self.session.record_cycle(true),
            Ok(None) => {}
            Err(e @ PipelineError::InsufficientData { .. }) => {
                log::debug!("pipeline: cycle skipped: {e}");
                self.session.record_cycle(false);
            }
            Err(e) => {
                log::warn!("pipeline: cycle skipped: {e}");
                self.session.record_cycle(false);
            }
        }
    }

    /// Run one analysis cycle.
    ///
    /// Returns `Ok(None)` when the queue was empty, `Ok(Some(cycle))` after
    /// the sink received a result, and `Err` when the cycle was skipped.
    pub async fn run_cycle(&mut self) -> Result<Option<u64>, PipelineError> {
        let Some(frame) = self.queue.try_dequeue() else {
            return Ok(None);
        };

        let window = self
            .windows
            .build(&frame)
            .ok_or(PipelineError::InsufficientData {
                available: frame.frames(),
                required: self.windows.window_size(),
            })?;
        drop(frame);

        // ── Separation (blocking → thread pool) ─────────────────────────
        let engine = Arc::clone(&self.engine);
        let (window, separated) = tokio::task::spawn_blocking(move || {
            let result = engine.separate(&window);
            (window, result)
        })
        .await
        .map_err(|e| PipelineError::Internal(e.to_string()))?;
        let separated = separated.map_err(PipelineError::Separation)?;

        if separated.n_components() < 2 {
            return Err(PipelineError::TooFewComponents(separated.n_components()));
        }

        // ── Metrics ──────────────────────────────────────────────────────
        let metrics = metrics::compute(&separated.component(0), &separated.component(1))
            .map_err(PipelineError::Metrics)?;

        let cycle = self.next_cycle;
        self.next_cycle += 1;

        let output = CycleOutput {
            cycle,
            window,
            separated,
            metrics,
        };
        self.sink.present(&output);

        self.history.push(HistoryEntry {
            cycle,
            window: output.window,
            separated: output.separated,
        });
        Ok(Some(cycle))
    }

    fn finish(mut self) -> anyhow::Result<Option<PathBuf>> {
        self.session.stop();
        let discarded = self.queue.clear();
        log::info!(
            "pipeline: analysis loop stopped ({} cycles retained, {discarded} queued frames discarded)",
            self.history.len()
        );
        self.sink.export(&self.history)
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Log statistics every `interval` and request shutdown after a stream
/// fault.  Returns when shutdown is requested by anyone.
///
/// `interval` is raised to [`MIN_TIMER_PERIOD`] if shorter.
pub async fn run_monitor(
    session: Arc<Session>,
    queue: Arc<FrameQueue>,
    interval: Duration,
    shutdown: Arc<watch::Sender<bool>>,
) {
    let mut ticker = tokio::time::interval(interval.max(MIN_TIMER_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stop = shutdown.subscribe();

    loop {
        let stop_requested = *stop.borrow();
        if stop_requested {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                log::info!(
                    "monitor: queue {}/{} (enqueued {}, dropped {}); {}",
                    queue.len(),
                    queue.capacity(),
                    queue.enqueued(),
                    queue.dropped(),
                    session.stats()
                );
                if session.has_fault() {
                    log::error!("monitor: audio stream fault, stopping");
                    session.stop();
                    shutdown.send_replace(true);
                    break;
                }
            }
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

/// Resolve once `shutdown` holds `true` or its sender is gone.
///
/// The current value is checked first, so a request sent before this
/// receiver was created is still honoured.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop_requested = *shutdown.borrow_and_update();
        if stop_requested {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::audio::AudioFrame;
    use crate::separation::MockSeparationEngine;

    const WINDOW: usize = 64;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Records the cycles it is shown and the history sizes it exports.
    #[derive(Clone, Default)]
    struct Recorder {
        presented: Arc<Mutex<Vec<u64>>>,
        exported: Arc<Mutex<Vec<usize>>>,
    }

    impl Sink for Recorder {
        fn present(&mut self, output: &CycleOutput) {
            self.presented.lock().unwrap().push(output.cycle);
        }

        fn export(&mut self, history: &History) -> anyhow::Result<Option<PathBuf>> {
            self.exported.lock().unwrap().push(history.len());
            Ok(None)
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.window_size = WINDOW;
        config.audio.update_interval_ms = 1;
        config
    }

    /// Two distinct tones, interleaved.
    fn frame(frames: usize) -> AudioFrame {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f32 / 64.0;
            samples.push((t * 6.0).sin());
            samples.push((t * 17.0).cos() * 0.5);
        }
        AudioFrame::new(samples, 2, 44_100)
    }

    fn make_orchestrator(
        engine: MockSeparationEngine,
    ) -> (PipelineOrchestrator, Arc<FrameQueue>, Recorder, Arc<Session>) {
        let queue = Arc::new(FrameQueue::new(8));
        let recorder = Recorder::default();
        let session = Session::new();
        let orc = PipelineOrchestrator::new(
            &config(),
            Arc::clone(&queue),
            Arc::new(engine),
            Box::new(recorder.clone()),
            Arc::clone(&session),
        )
        .unwrap();
        (orc, queue, recorder, session)
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    // -----------------------------------------------------------------------
    // run_cycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn empty_queue_does_not_call_sink() {
        let (mut orc, _queue, recorder, _session) = make_orchestrator(MockSeparationEngine::echo());

        assert!(matches!(orc.run_cycle().await, Ok(None)));
        assert!(recorder.presented.lock().unwrap().is_empty());
        assert!(orc.history().is_empty());
    }

    #[tokio::test]
    async fn successful_cycle_presents_and_appends_history() {
        let (mut orc, queue, recorder, _session) = make_orchestrator(MockSeparationEngine::echo());
        queue.try_enqueue(frame(WINDOW * 2));
        queue.try_enqueue(frame(WINDOW));

        assert!(matches!(orc.run_cycle().await, Ok(Some(0))));
        assert!(matches!(orc.run_cycle().await, Ok(Some(1))));

        assert_eq!(*recorder.presented.lock().unwrap(), vec![0, 1]);
        assert_eq!(orc.history().len(), 2);
        let first = orc.history().iter().next().unwrap();
        assert_eq!(first.window.window_size(), WINDOW);
        assert_eq!(first.separated.len(), WINDOW);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn short_frame_skips_cycle() {
        let (mut orc, queue, recorder, _session) = make_orchestrator(MockSeparationEngine::echo());
        queue.try_enqueue(frame(WINDOW - 1));

        let err = orc.run_cycle().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData {
                available: 63,
                required: 64
            }
        ));
        assert!(recorder.presented.lock().unwrap().is_empty());
        assert!(orc.history().is_empty());
    }

    #[tokio::test]
    async fn failing_engine_skips_cycle() {
        let engine = MockSeparationEngine::err(SeparationError::RankDeficient { eigenvalue: 0.0 });
        let (mut orc, queue, recorder, _session) = make_orchestrator(engine);
        queue.try_enqueue(frame(WINDOW));

        let err = orc.run_cycle().await.unwrap_err();
        assert!(matches!(err, PipelineError::Separation(_)));
        assert!(err.to_string().contains("rank deficient"), "{err}");
        assert!(recorder.presented.lock().unwrap().is_empty());
        assert!(orc.history().is_empty());
    }

    #[tokio::test]
    async fn history_respects_limit() {
        let queue = Arc::new(FrameQueue::new(8));
        let mut cfg = config();
        cfg.export.history_limit = Some(2);
        let mut orc = PipelineOrchestrator::new(
            &cfg,
            Arc::clone(&queue),
            Arc::new(MockSeparationEngine::echo()),
            Box::new(Recorder::default()),
            Session::new(),
        )
        .unwrap();

        for _ in 0..4 {
            queue.try_enqueue(frame(WINDOW));
            orc.run_cycle().await.unwrap();
        }
        let cycles: Vec<u64> = orc.history().iter().map(|e| e.cycle).collect();
        assert_eq!(cycles, vec![2, 3]);
    }

    #[test]
    fn invalid_config_is_rejected_instead_of_panicking() {
        let build = |cfg: &AppConfig| {
            PipelineOrchestrator::new(
                cfg,
                Arc::new(FrameQueue::new(2)),
                Arc::new(MockSeparationEngine::echo()),
                Box::new(Recorder::default()),
                Session::new(),
            )
        };

        let mut cfg = config();
        cfg.audio.window_size = 0;
        assert!(matches!(
            build(&cfg),
            Err(ConfigError::Zero {
                field: "window_size"
            })
        ));

        let mut cfg = config();
        cfg.audio.update_interval_ms = 0;
        assert!(matches!(
            build(&cfg),
            Err(ConfigError::Zero {
                field: "update_interval_ms"
            })
        ));
    }

    // -----------------------------------------------------------------------
    // run loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn run_processes_frames_and_exports_on_shutdown() {
        let (orc, queue, recorder, session) = make_orchestrator(MockSeparationEngine::echo());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(orc.run(rx));

        queue.try_enqueue(frame(WINDOW));
        queue.try_enqueue(frame(WINDOW));
        wait_for(|| session.stats().cycles_completed == 2).await;

        tx.send_replace(true);
        let archive = task.await.unwrap().unwrap();

        assert_eq!(archive, None);
        assert_eq!(recorder.presented.lock().unwrap().len(), 2);
        assert_eq!(*recorder.exported.lock().unwrap(), vec![2]);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn failing_engine_keeps_loop_running() {
        let engine = MockSeparationEngine::err(SeparationError::Numerical("nan".into()));
        let (orc, queue, recorder, session) = make_orchestrator(engine);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(orc.run(rx));

        for _ in 0..3 {
            queue.try_enqueue(frame(WINDOW));
        }
        wait_for(|| session.stats().cycles_skipped == 3).await;

        tx.send_replace(true);
        task.await.unwrap().unwrap();

        assert!(recorder.presented.lock().unwrap().is_empty());
        assert_eq!(*recorder.exported.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn shutdown_discards_queued_frames() {
        let (orc, queue, recorder, _session) = make_orchestrator(MockSeparationEngine::echo());
        for _ in 0..5 {
            queue.try_enqueue(frame(WINDOW));
        }

        let (_tx, rx) = watch::channel(true);
        orc.run(rx).await.unwrap();

        assert!(queue.is_empty());
        assert!(recorder.presented.lock().unwrap().is_empty());
        assert_eq!(*recorder.exported.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn dropped_sender_stops_loop() {
        let (orc, _queue, recorder, _session) = make_orchestrator(MockSeparationEngine::echo());
        let (tx, rx) = watch::channel(false);
        drop(tx);

        orc.run(rx).await.unwrap();
        assert_eq!(recorder.exported.lock().unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // monitor
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn monitor_requests_shutdown_on_stream_fault() {
        let session = Session::new();
        let queue = Arc::new(FrameQueue::new(4));
        let (tx, mut rx) = watch::channel(false);

        session.record_fault("device lost");
        run_monitor(Arc::clone(&session), queue, Duration::from_millis(1), Arc::new(tx)).await;

        assert!(*rx.borrow_and_update());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn monitor_with_zero_interval_still_ticks() {
        let session = Session::new();
        let queue = Arc::new(FrameQueue::new(4));
        let (tx, _rx) = watch::channel(false);

        session.record_fault("device lost");
        tokio::time::timeout(
            Duration::from_secs(1),
            run_monitor(Arc::clone(&session), queue, Duration::ZERO, Arc::new(tx)),
        )
        .await
        .expect("monitor should stop on the fault");
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn monitor_exits_when_shutdown_is_requested() {
        let session = Session::new();
        let queue = Arc::new(FrameQueue::new(4));
        let (tx, _rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let trigger = Arc::clone(&tx);

        let task = tokio::spawn(run_monitor(
            Arc::clone(&session),
            queue,
            Duration::from_millis(5),
            tx,
        ));
        trigger.send_replace(true);
        task.await.unwrap();

        assert!(session.is_running());
    }

    // -----------------------------------------------------------------------
    // wait_for_shutdown
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn wait_for_shutdown_sees_request_sent_before_subscribing() {
        let (tx, _rx) = watch::channel(false);
        tx.send_replace(true);

        let mut late = tx.subscribe();
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut late))
            .await
            .expect("an earlier shutdown request must not be missed");
    }

    #[tokio::test]
    async fn wait_for_shutdown_after_monitor_fault_already_fired() {
        let session = Session::new();
        let queue = Arc::new(FrameQueue::new(4));
        let (tx, _rx) = watch::channel(false);
        let tx = Arc::new(tx);

        session.record_fault("device lost");
        run_monitor(
            Arc::clone(&session),
            queue,
            Duration::from_millis(1),
            Arc::clone(&tx),
        )
        .await;

        let mut stop = tx.subscribe();
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut stop))
            .await
            .expect("fault-triggered shutdown must be observed");
    }

    #[tokio::test]
    async fn wait_for_shutdown_waits_for_true() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { wait_for_shutdown(&mut rx).await });

        tx.send_replace(false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_shutdown_returns_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut rx))
            .await
            .expect("closed channel ends the wait");
    }
}
