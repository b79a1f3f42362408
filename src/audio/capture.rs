//! Input device capture via `cpal`.
//!
//! [`CaptureSource`] wraps the cpal host/device/stream lifecycle:
//!
//! 1. [`CaptureSource::open`] picks the first input device whose name contains
//!    the configured filter.
//! 2. [`CaptureSource::verify_signal`] runs a short test stream and checks that
//!    something audible is arriving.
//! 3. [`CaptureSource::start`] begins continuous capture, handing every block
//!    to a callback as an [`AudioFrame`].
//! 4. [`CaptureSource::stop`] (or dropping the source) stops the stream.
//!
//! The frame callback runs on cpal's real-time audio thread.  It must not
//! block; the pipeline only does a non-blocking queue push there.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::RecvTimeoutError;
use thiserror::Error;

use crate::config::AudioConfig;

/// Blocks inspected by the startup signal check.
const VERIFY_ATTEMPTS: usize = 3;
/// Pause after a block that did not reach the threshold.
const VERIFY_PAUSE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One block of audio as delivered by a single device callback.
///
/// Samples are interleaved `f32`: `[l0, r0, l1, r1, …]` for two channels.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved PCM samples.
    pub samples: Vec<f32>,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        peak_amplitude(&self.samples)
    }

    /// `true` when every sample is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }
}

/// Largest absolute value in `samples` (`0.0` when empty).
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening, verifying or starting capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device name contains {filter:?}")]
    DeviceNotFound { filter: String },

    #[error("no signal detected: peak {peak:.6} below threshold {threshold:.6}")]
    SignalNotDetected { peak: f32, threshold: f32 },

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value drops the `cpal::Stream`, which stops the hardware
/// stream.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureSource
// ---------------------------------------------------------------------------

/// A selected input device plus the stream settings used to open it.
pub struct CaptureSource {
    device: cpal::Device,
    device_name: String,
    stream_config: cpal::StreamConfig,
    channels: u16,
    sample_rate: u32,
    block_size: u32,
    min_signal_threshold: f32,
    stream: Option<StreamHandle>,
}

impl CaptureSource {
    /// Select the first input device whose name contains
    /// `config.device_name` (case-sensitive).
    ///
    /// Every available input device is logged at info level for diagnostics.
    ///
    /// # Errors
    ///
    /// [`CaptureError::DeviceNotFound`] when nothing matches, or
    /// [`CaptureError::Devices`] when the host cannot list devices.
    pub fn open(config: &AudioConfig) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        log::info!("audio host: {:?}", host.id());

        let mut candidates = Vec::new();
        for (index, device) in host.input_devices()?.enumerate() {
            let name = device.name().unwrap_or_else(|_| "<unnamed>".into());
            log::info!("input device {index}: {name}");
            candidates.push((name, device));
        }

        let (device_name, device) = select_device(candidates, &config.device_name).ok_or_else(
            || CaptureError::DeviceNotFound {
                filter: config.device_name.clone(),
            },
        )?;
        log::info!("selected input device {device_name:?}");

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        Ok(Self {
            device,
            device_name,
            stream_config,
            channels: config.channels,
            sample_rate: config.sample_rate,
            block_size: config.buffer_size,
            min_signal_threshold: config.min_signal_threshold,
            stream: None,
        })
    }

    /// Name of the selected device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Returns `true` while a continuous stream is running.
    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Run a short test stream and check that some block reaches
    /// `min_signal_threshold`.
    ///
    /// Up to three blocks are inspected.  The test stream is closed before
    /// this returns.
    ///
    /// # Errors
    ///
    /// [`CaptureError::SignalNotDetected`] when no block is loud enough, or a
    /// stream error if the test stream cannot be opened.
    pub fn verify_signal(&self) -> Result<f32, CaptureError> {
        let (tx, rx) = crossbeam_channel::bounded::<Vec<f32>>(VERIFY_ATTEMPTS);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.try_send(data.to_vec());
            },
            |err: cpal::StreamError| {
                log::error!("test stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        // A block should arrive within one block period; allow generous slack
        // for device start-up.
        let block_period = Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64);
        let wait = block_period * 4 + Duration::from_millis(250);

        let result = check_signal(
            || match rx.recv_timeout(wait) {
                Ok(block) => Some(block),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("signal check: no block within {wait:?}");
                    None
                }
                Err(RecvTimeoutError::Disconnected) => None,
            },
            self.min_signal_threshold,
            VERIFY_ATTEMPTS,
            VERIFY_PAUSE,
        );

        drop(stream);
        result
    }

    /// Begin continuous capture.
    ///
    /// `on_frame` is invoked on the audio thread for every delivered block;
    /// `on_error` receives runtime stream faults.  Calling `start` while
    /// already running is a no-op.
    ///
    /// # Errors
    ///
    /// [`CaptureError::BuildStream`] or [`CaptureError::PlayStream`] if the
    /// platform rejects the stream configuration.
    pub fn start<F, E>(&mut self, mut on_frame: F, on_error: E) -> Result<(), CaptureError>
    where
        F: FnMut(AudioFrame) + Send + 'static,
        E: FnMut(cpal::StreamError) + Send + 'static,
    {
        if self.stream.is_some() {
            log::warn!("capture already running on {:?}", self.device_name);
            return Ok(());
        }

        let channels = self.channels;
        let sample_rate = self.sample_rate;

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                on_frame(AudioFrame::new(data.to_vec(), channels, sample_rate));
            },
            on_error,
            None,
        )?;

        stream.play()?;
        self.stream = Some(StreamHandle { _stream: stream });

        log::info!(
            "capture started on {:?} ({} Hz, {} ch, block {})",
            self.device_name,
            self.sample_rate,
            self.channels,
            self.block_size
        );
        Ok(())
    }

    /// Stop capture.  Idempotent; safe before `start` or after a failed one.
    pub fn stop(&mut self) {
        if let Some(handle) = self.stream.take() {
            drop(handle);
            log::info!("capture stopped on {:?}", self.device_name);
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// First candidate whose name contains `filter` (case-sensitive).
pub fn select_device<T>(
    candidates: impl IntoIterator<Item = (String, T)>,
    filter: &str,
) -> Option<(String, T)> {
    candidates
        .into_iter()
        .find(|(name, _)| name.contains(filter))
}

/// Pull up to `attempts` blocks from `next_block` and return the first peak
/// that reaches `threshold`.
///
/// `next_block` returning `None` counts as a failed attempt.  `pause` is slept
/// after every failed attempt except the last.
pub fn check_signal(
    mut next_block: impl FnMut() -> Option<Vec<f32>>,
    threshold: f32,
    attempts: usize,
    pause: Duration,
) -> Result<f32, CaptureError> {
    let mut loudest = 0.0_f32;

    for attempt in 1..=attempts {
        if let Some(block) = next_block() {
            let peak = peak_amplitude(&block);
            log::info!("signal check {attempt}/{attempts}: peak {peak:.6}");
            if peak >= threshold {
                return Ok(peak);
            }
            loudest = loudest.max(peak);
        }
        if attempt < attempts && !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }

    log::warn!("audio signal not detected during the startup check");
    Err(CaptureError::SignalNotDetected {
        peak: loudest,
        threshold,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
