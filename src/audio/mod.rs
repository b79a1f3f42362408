//! Audio front end: device capture, bounded frame queue, analysis window.
//!
//! # Pipeline
//!
//! ```text
//! Input device → cpal callback → AudioFrame → FrameProducer::try_enqueue
//!             … FrameQueue::try_dequeue → build_window → AnalysisWindow
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use live_ica::audio::{CaptureSource, FrameQueue, WindowBuilder};
//! use live_ica::config::AudioConfig;
//!
//! let config = AudioConfig::default();
//! let queue = FrameQueue::new(config.queue_size);
//! let producer = queue.producer();
//!
//! let mut capture = CaptureSource::open(&config).unwrap();
//! capture.verify_signal().unwrap();
//! capture
//!     .start(move |frame| { producer.try_enqueue(frame); }, |err| log::error!("{err}"))
//!     .unwrap();
//!
//! let builder = WindowBuilder::new(config.window_size);
//! if let Some(frame) = queue.try_dequeue() {
//!     if let Some(window) = builder.build(&frame) {
//!         println!("window {}×{}", window.window_size(), window.channels());
//!     }
//! }
//! capture.stop();
//! ```

pub mod capture;
pub mod queue;
pub mod window;

pub use capture::{AudioFrame, CaptureError, CaptureSource, StreamHandle};
pub use queue::{FrameProducer, FrameQueue};
pub use window::{build_window, normalize_columns, AnalysisWindow, WindowBuilder};
