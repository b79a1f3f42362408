//! Analysis pipeline: orchestrator, sinks and shared session state.
//!
//! # Architecture
//!
//! ```text
//! cpal callback ──Session::frame_handler──▶ FrameQueue (bounded, drop on full)
//!                                                │
//! PipelineOrchestrator::run()  ← tokio task, every update_interval
//!        │
//!        ├─ try_dequeue → AnalysisWindow (truncate + z-score)
//!        ├─ spawn_blocking(SeparationEngine::separate)
//!        ├─ metrics::compute(component 0, component 1)
//!        └─ Sink::present, History::push
//!
//! run_monitor()  ← tokio task, every monitoring_interval
//!        └─ logs queue / session stats, stops on stream fault
//!
//! shutdown (watch channel) → queue cleared → Sink::export(History)
//! ```

pub mod runner;
pub mod session;
pub mod sink;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{run_monitor, wait_for_shutdown, PipelineError, PipelineOrchestrator};
pub use session::{Session, SessionStats};
pub use sink::{ArchiveSink, CycleOutput, History, HistoryEntry, LogSink, Sink};
