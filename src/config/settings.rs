//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! The configuration is read once at startup and never mutated afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration value that the pipeline cannot run with.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("n_components must be at least 2 (got {0}); metrics compare two components")]
    TooFewComponents(usize),

    #[error("n_components ({components}) cannot exceed the channel count ({channels})")]
    TooManyComponents { components: usize, channels: u16 },

    #[error("{field} must be a positive, finite number (got {value})")]
    NotPositive { field: &'static str, value: f64 },
}

// ---------------------------------------------------------------------------
// SignalPolicy
// ---------------------------------------------------------------------------

/// What to do when the startup signal check hears nothing.
///
/// | Variant | Behaviour                                     |
/// |---------|-----------------------------------------------|
/// | Fatal   | Refuse to start continuous capture            |
/// | Warn    | Log a warning and start capturing anyway      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalPolicy {
    Fatal,
    Warn,
}

impl Default for SignalPolicy {
    fn default() -> Self {
        Self::Fatal
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Shortest period handed to a tokio interval (which panics on zero).
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Longest monitor period.
pub const MAX_MONITOR_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings for capture, queueing and windowing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Case-sensitive substring matched against input device names.
    pub device_name: String,
    /// Interleaved channel count requested from the device.
    pub channels: u16,
    /// Samples per channel in one analysis window.
    pub window_size: usize,
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Number of separated components produced per window.
    pub n_components: usize,
    /// Frames per channel delivered by one device callback (block size).
    pub buffer_size: u32,
    /// Period of the analysis timer in milliseconds.
    pub update_interval_ms: u64,
    /// Peak amplitude the startup check must reach.
    pub min_signal_threshold: f32,
    /// Capacity of the frame queue (in frames).
    pub queue_size: usize,
    /// Period of the statistics / fault monitor in seconds.
    pub monitoring_interval_secs: f64,
    /// Severity of a failed startup signal check.
    #[serde(default)]
    pub signal_policy: SignalPolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_name: "BlackHole".into(),
            channels: 2,
            window_size: 2048,
            sample_rate: 44_100,
            n_components: 2,
            buffer_size: 4410,
            update_interval_ms: 50,
            min_signal_threshold: 0.01,
            queue_size: 100,
            monitoring_interval_secs: 1.0,
            signal_policy: SignalPolicy::default(),
        }
    }
}

impl AudioConfig {
    /// Time covered by one device block (`buffer_size / sample_rate`).
    pub fn block_period(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate as f64)
    }

    /// Period of the analysis timer, never shorter than [`MIN_TIMER_PERIOD`].
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms).max(MIN_TIMER_PERIOD)
    }

    /// Period of the monitor task.
    ///
    /// Zero, negative and NaN fall back to [`MIN_TIMER_PERIOD`]; anything
    /// above [`MAX_MONITOR_PERIOD`] (infinity included) is capped.
    pub fn monitoring_interval(&self) -> Duration {
        let secs = self.monitoring_interval_secs;
        if secs.is_nan() || secs <= 0.0 {
            return MIN_TIMER_PERIOD;
        }
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_MONITOR_PERIOD)
            .clamp(MIN_TIMER_PERIOD, MAX_MONITOR_PERIOD)
    }

    /// Analysis ticks per captured block.
    ///
    /// Below `1.0` the analysis loop drains slower than frames arrive and the
    /// queue will eventually overflow.
    pub fn cadence_ratio(&self) -> f64 {
        self.block_period().as_secs_f64() / self.update_interval().as_secs_f64()
    }
}

// ---------------------------------------------------------------------------
// SeparationConfig
// ---------------------------------------------------------------------------

/// Convergence settings for the separation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparationConfig {
    /// Maximum fixed-point iterations per window.
    pub max_iter: usize,
    /// Convergence tolerance on the unmixing matrix update.
    pub tolerance: f64,
    /// Seed for the initial unmixing matrix; identical input + seed gives
    /// identical output.
    pub random_seed: u64,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tolerance: 0.01,
            random_seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// ExportConfig
// ---------------------------------------------------------------------------

/// End-of-run archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Write the recorded history when the run ends.
    pub enabled: bool,
    /// Archive directory.  `None` uses [`AppPaths::graphs_dir`].
    pub output_dir: Option<PathBuf>,
    /// Keep at most this many cycles in memory (oldest dropped first).
    ///
    /// `None` keeps every cycle until shutdown.  Each retained cycle holds
    /// the window and the separated components, `2 × window_size × channels`
    /// `f64`s: 64 KiB with the defaults.  One cycle completes per captured
    /// block (every 100 ms by default), so an unlimited run grows by about
    /// 640 KiB per second, roughly 2.3 GB per hour, and the JSON archive
    /// written at shutdown is several times larger.  Set a limit for long
    /// sessions.
    pub history_limit: Option<usize>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: None,
            history_limit: None,
        }
    }
}

impl ExportConfig {
    /// Directory the archive sink writes into.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().graphs_dir)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use live_ica::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Capture / queue / window settings.
    pub audio: AudioConfig,
    /// Separation engine settings.
    pub separation: SeparationConfig,
    /// History archive settings.
    pub export: ExportConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every value the pipeline depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.audio;

        if a.channels == 0 {
            return Err(ConfigError::Zero { field: "channels" });
        }
        if a.window_size == 0 {
            return Err(ConfigError::Zero { field: "window_size" });
        }
        if a.sample_rate == 0 {
            return Err(ConfigError::Zero { field: "sample_rate" });
        }
        if a.buffer_size == 0 {
            return Err(ConfigError::Zero { field: "buffer_size" });
        }
        if a.queue_size == 0 {
            return Err(ConfigError::Zero { field: "queue_size" });
        }
        if a.update_interval_ms == 0 {
            return Err(ConfigError::Zero {
                field: "update_interval_ms",
            });
        }
        if a.n_components < 2 {
            return Err(ConfigError::TooFewComponents(a.n_components));
        }
        if a.n_components > a.channels as usize {
            return Err(ConfigError::TooManyComponents {
                components: a.n_components,
                channels: a.channels,
            });
        }
        if !(a.monitoring_interval_secs.is_finite() && a.monitoring_interval_secs > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "monitoring_interval_secs",
                value: a.monitoring_interval_secs,
            });
        }
        if self.separation.max_iter == 0 {
            return Err(ConfigError::Zero { field: "max_iter" });
        }
        let tol = self.separation.tolerance;
        if !(tol.is_finite() && tol > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "tolerance",
                value: tol,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
