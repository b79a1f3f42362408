//! Source separation.
//!
//! # Architecture
//!
//! ```text
//! AnalysisWindow ──▶ SeparationEngine (trait) ──▶ SeparatedSignals
//!                          │
//!                          └── FastIca  (symmetric FastICA, logcosh)
//! ```
//!
//! The pipeline holds an `Arc<dyn SeparationEngine>` and calls it from tokio's
//! blocking pool.  A failed call skips one analysis cycle.
//!
//! # Quick start
//!
//! ```rust
//! use live_ica::audio::AnalysisWindow;
//! use live_ica::config::SeparationConfig;
//! use live_ica::separation::{FastIca, SeparationEngine};
//! use nalgebra::DMatrix;
//!
//! let engine = FastIca::new(2, &SeparationConfig::default());
//! let window = AnalysisWindow::from_matrix(DMatrix::from_fn(1024, 2, |r, c| {
//!     let t = r as f64 / 1024.0;
//!     let a = (2.0 * std::f64::consts::PI * 3.0 * t).sin();
//!     let b = ((r * 37) % 101) as f64 / 101.0 - 0.5;
//!     if c == 0 { a + 0.5 * b } else { 0.3 * a + b }
//! }));
//!
//! match engine.separate(&window) {
//!     Ok(sources) => assert_eq!(sources.len(), 1024),
//!     Err(e) => println!("cycle skipped: {e}"),
//! }
//! ```

pub mod engine;
pub mod fastica;

pub use engine::{SeparatedSignals, SeparationEngine, SeparationError};
pub use fastica::FastIca;

// test-only re-export so the pipeline tests can import the mock directly.
#[cfg(test)]
pub use engine::MockSeparationEngine;
