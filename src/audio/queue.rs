//! Bounded frame queue between the capture callback and the analysis loop.
//!
//! When the queue is full, new frames are **dropped**: the producer never
//! blocks and queued frames are never overwritten.  For a live display the
//! most recent data matters more than completeness, and the audio thread must
//! finish well inside one block period.
//!
//! # Example
//!
//! ```rust
//! use live_ica::audio::{AudioFrame, FrameQueue};
//!
//! let queue = FrameQueue::new(2);
//! let frame = || AudioFrame::new(vec![0.5; 4], 2, 44_100);
//!
//! assert!(queue.try_enqueue(frame()));
//! assert!(queue.try_enqueue(frame()));
//! assert!(!queue.try_enqueue(frame())); // full → dropped
//! assert_eq!(queue.dropped(), 1);
//! assert!(queue.try_dequeue().is_some());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::capture::AudioFrame;

/// Log a drop warning on the first drop and then every this many drops.
const DROP_LOG_EVERY: u64 = 100;

// ---------------------------------------------------------------------------
// QueueStats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct QueueStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

// ---------------------------------------------------------------------------
// FrameProducer
// ---------------------------------------------------------------------------

/// Producer half of a [`FrameQueue`], moved into the audio callback.
#[derive(Clone)]
pub struct FrameProducer {
    tx: Sender<AudioFrame>,
    stats: Arc<QueueStats>,
}

impl FrameProducer {
    /// Push `frame` without blocking.
    ///
    /// Returns `false` and discards the frame when the queue is full (or the
    /// consumer is gone).  The queue contents are left unchanged.
    pub fn try_enqueue(&self, frame: AudioFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % DROP_LOG_EVERY == 0 {
                    log::warn!("frame queue full; {dropped} frame(s) dropped so far");
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FrameQueue
// ---------------------------------------------------------------------------

/// Bounded FIFO of [`AudioFrame`]s with drop-on-full backpressure.
///
/// The queue owns the consumer side; hand [`producer`](Self::producer) to the
/// capture callback.  Single producer / single consumer is the intended use,
/// though the underlying channel tolerates more.
pub struct FrameQueue {
    producer: FrameProducer,
    rx: Receiver<AudioFrame>,
    capacity: usize,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FrameQueue capacity must be > 0");
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            producer: FrameProducer {
                tx,
                stats: Arc::new(QueueStats::default()),
            },
            rx,
            capacity,
        }
    }

    /// A producer handle for the capture thread.
    pub fn producer(&self) -> FrameProducer {
        self.producer.clone()
    }

    /// Push from the consumer's side (same semantics as
    /// [`FrameProducer::try_enqueue`]).
    pub fn try_enqueue(&self, frame: AudioFrame) -> bool {
        self.producer.try_enqueue(frame)
    }

    /// Pop the oldest frame, if any.  Never blocks.
    pub fn try_dequeue(&self) -> Option<AudioFrame> {
        self.rx.try_recv().ok()
    }

    /// Discard every queued frame and return how many were discarded.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` when no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of queued frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames accepted since creation.
    pub fn enqueued(&self) -> u64 {
        self.producer.stats.enqueued.load(Ordering::Relaxed)
    }

    /// Frames rejected since creation.
    pub fn dropped(&self) -> u64 {
        self.producer.stats.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: f32) -> AudioFrame {
        AudioFrame::new(vec![value; 8], 2, 44_100)
    }

    #[test]
    fn fifo_order() {
        let queue = FrameQueue::new(4);
        for v in [1.0, 2.0, 3.0] {
            assert!(queue.try_enqueue(frame(v)));
        }
        let order: Vec<f32> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|f| f.samples[0])
            .collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn ten_offers_into_capacity_five() {
        let queue = FrameQueue::new(5);
        let results: Vec<bool> = (0..10).map(|i| queue.try_enqueue(frame(i as f32))).collect();

        assert_eq!(results.iter().filter(|&&ok| ok).count(), 5);
        assert_eq!(results.iter().filter(|&&ok| !ok).count(), 5);
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.enqueued(), 5);
        assert_eq!(queue.dropped(), 5);
    }

    #[test]
    fn full_queue_keeps_oldest_frames() {
        let queue = FrameQueue::new(2);
        queue.try_enqueue(frame(1.0));
        queue.try_enqueue(frame(2.0));
        assert!(!queue.try_enqueue(frame(3.0)));

        assert_eq!(queue.try_dequeue().unwrap().samples[0], 1.0);
        assert_eq!(queue.try_dequeue().unwrap().samples[0], 2.0);
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let queue = FrameQueue::new(3);
        for i in 0..50 {
            queue.try_enqueue(frame(i as f32));
            assert!(queue.len() <= queue.capacity());
            if i % 7 == 0 {
                queue.try_dequeue();
            }
        }
    }

    #[test]
    fn dequeue_on_empty_returns_none() {
        let queue = FrameQueue::new(1);
        assert!(queue.is_empty());
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn clear_discards_everything() {
        let queue = FrameQueue::new(4);
        queue.try_enqueue(frame(1.0));
        queue.try_enqueue(frame(2.0));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn producer_works_across_threads() {
        let queue = FrameQueue::new(8);
        let producer = queue.producer();

        let handle = std::thread::spawn(move || {
            (0..20).filter(|&i| producer.try_enqueue(frame(i as f32))).count()
        });
        let accepted = handle.join().unwrap();

        assert_eq!(accepted, 8);
        assert_eq!(queue.enqueued() + queue.dropped(), 20);
    }

    #[test]
    #[should_panic(expected = "FrameQueue capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = FrameQueue::new(0);
    }
}
