//! Run-time state shared between the capture callback, the analysis loop and
//! the monitor task.
//!
//! [`Session`] is created once in `main` and handed around as an
//! `Arc<Session>`.  Everything in it is an atomic, so the audio thread never
//! takes a lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::{AudioFrame, FrameProducer};

/// Log a capture progress line at debug level every this many frames.
const FRAME_LOG_EVERY: u64 = 100;

// ---------------------------------------------------------------------------
// SessionStats
// ---------------------------------------------------------------------------

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_captured: u64,
    pub frames_silent: u64,
    pub stream_faults: u64,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "captured {} (silent {}), cycles {} ok / {} skipped, stream faults {}",
            self.frames_captured,
            self.frames_silent,
            self.cycles_completed,
            self.cycles_skipped,
            self.stream_faults
        )
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Session {
    running: AtomicBool,
    frames_captured: AtomicU64,
    frames_silent: AtomicU64,
    stream_faults: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
}

impl Session {
    /// A new session in the running state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            ..Self::default()
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Mark the session as stopping.  Frames arriving afterwards are ignored.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            log::info!("session stopping");
        }
    }

    /// Record a runtime stream fault reported by the audio backend.
    pub fn record_fault(&self, message: &str) {
        let n = self.stream_faults.fetch_add(1, Ordering::Relaxed) + 1;
        log::error!("audio stream error #{n}: {message}");
    }

    pub fn has_fault(&self) -> bool {
        self.stream_faults.load(Ordering::Relaxed) > 0
    }

    pub fn record_cycle(&self, completed: bool) {
        if completed {
            self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_silent: self.frames_silent.load(Ordering::Relaxed),
            stream_faults: self.stream_faults.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
        }
    }

    /// Handle one frame on the audio thread.
    ///
    /// Frames are ignored once the session stops; all-zero frames are
    /// counted as silent and not queued.  Returns `true` when the frame was
    /// queued.
    pub fn accept_frame(&self, producer: &FrameProducer, frame: AudioFrame) -> bool {
        if !self.is_running() {
            return false;
        }
        let n = self.frames_captured.fetch_add(1, Ordering::Relaxed) + 1;
        if n % FRAME_LOG_EVERY == 0 {
            log::debug!("captured {n} frames (peak {:.4})", frame.peak());
        }

        if frame.is_silent() {
            self.frames_silent.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        producer.try_enqueue(frame)
    }

    /// Callback for [`crate::audio::CaptureSource::start`]'s frame argument.
    pub fn frame_handler(
        self: &Arc<Self>,
        producer: FrameProducer,
    ) -> impl FnMut(AudioFrame) + Send + 'static {
        let session = Arc::clone(self);
        move |frame: AudioFrame| {
            session.accept_frame(&producer, frame);
        }
    }

    /// Callback for [`crate::audio::CaptureSource::start`]'s error argument.
    pub fn error_handler(self: &Arc<Self>) -> impl FnMut(cpal::StreamError) + Send + 'static {
        let session = Arc::clone(self);
        move |err: cpal::StreamError| session.record_fault(&err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrameQueue;

    fn loud() -> AudioFrame {
        AudioFrame::new(vec![0.25, -0.5, 0.1, 0.3], 2, 44_100)
    }

    fn silent() -> AudioFrame {
        AudioFrame::new(vec![0.0; 4], 2, 44_100)
    }

    #[test]
    fn new_session_is_running_without_faults() {
        let session = Session::new();
        assert!(session.is_running());
        assert!(!session.has_fault());
        assert_eq!(session.stats(), SessionStats::default());
    }

    #[test]
    fn loud_frames_are_queued_and_counted() {
        let session = Session::new();
        let queue = FrameQueue::new(4);
        let producer = queue.producer();

        assert!(session.accept_frame(&producer, loud()));
        assert_eq!(queue.len(), 1);
        assert_eq!(session.stats().frames_captured, 1);
    }

    #[test]
    fn silent_frames_are_counted_but_not_queued() {
        let session = Session::new();
        let queue = FrameQueue::new(4);

        assert!(!session.accept_frame(&queue.producer(), silent()));
        assert!(queue.is_empty());
        let stats = session.stats();
        assert_eq!(stats.frames_captured, 1);
        assert_eq!(stats.frames_silent, 1);
    }

    #[test]
    fn frames_after_stop_are_ignored() {
        let session = Session::new();
        let queue = FrameQueue::new(4);
        session.stop();
        session.stop();

        assert!(!session.is_running());
        assert!(!session.accept_frame(&queue.producer(), loud()));
        assert!(queue.is_empty());
        assert_eq!(session.stats().frames_captured, 0);
    }

    #[test]
    fn frame_handler_feeds_the_queue() {
        let session = Session::new();
        let queue = FrameQueue::new(2);
        let mut handler = session.frame_handler(queue.producer());

        handler(loud());
        handler(loud());
        handler(loud()); // full → dropped

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(session.stats().frames_captured, 3);
    }

    #[test]
    fn faults_are_recorded() {
        let session = Session::new();
        session.record_fault("device unplugged");
        assert!(session.has_fault());
        assert_eq!(session.stats().stream_faults, 1);
    }

    #[test]
    fn cycle_counters() {
        let session = Session::new();
        session.record_cycle(true);
        session.record_cycle(false);
        session.record_cycle(true);
        let stats = session.stats();
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.cycles_skipped, 1);
        assert!(stats.to_string().contains("2 ok / 1 skipped"));
    }
}
