//! Where `live-ica` reads its settings and leaves its recordings.
//!
//! Settings live in the platform config dir (`~/.config/live-ica/settings.toml`
//! on Linux).  End-of-run archives go to `graphs/` under the local data dir
//! unless `[export] output_dir` overrides it, and are named
//! `ica_recording_<YYYYmmdd_HHMMSS>.json` after the local time of export.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

const APP_DIR: &str = "live-ica";
const SETTINGS_FILE: &str = "settings.toml";
const ARCHIVE_DIR: &str = "graphs";

/// Prefix shared by every archive file.
pub const ARCHIVE_PREFIX: &str = "ica_recording_";
/// `chrono` format of the timestamp embedded in archive names.
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Resolved settings file and default archive directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Default archive directory.
    pub graphs_dir: PathBuf,
}

impl AppPaths {
    /// Paths under the platform config / local data directories.
    pub fn new() -> Self {
        Self::from_base(dirs::config_dir(), dirs::data_local_dir())
    }

    /// Paths under explicit base directories.  A missing base resolves
    /// relative to the working directory.
    pub fn from_base(config_base: Option<PathBuf>, data_base: Option<PathBuf>) -> Self {
        let under_app =
            |base: Option<PathBuf>| base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR);

        let config_dir = under_app(config_base);
        Self {
            settings_file: config_dir.join(SETTINGS_FILE),
            graphs_dir: under_app(data_base).join(ARCHIVE_DIR),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// `ica_recording_<YYYYmmdd_HHMMSS>.json` for an export taken at `at`.
pub fn archive_file_name<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{ARCHIVE_PREFIX}{}.json", at.format(ARCHIVE_TIMESTAMP_FORMAT))
}

/// Full archive path inside `dir` for an export taken at `at`.
pub fn archive_path<Tz>(dir: &Path, at: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    dir.join(archive_file_name(at))
}
