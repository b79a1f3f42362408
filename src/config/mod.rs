//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for capture,
//! separation and export, `AppPaths` for cross-platform directories, and TOML
//! persistence via `AppConfig::load` / `AppConfig::save_to`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, ConfigError, ExportConfig, SeparationConfig, SignalPolicy,
    MAX_MONITOR_PERIOD, MIN_TIMER_PERIOD,
};
