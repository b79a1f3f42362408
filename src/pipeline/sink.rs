//! Where cycle results go.
//!
//! The orchestrator calls [`Sink::present`] once per successful cycle and
//! [`Sink::export`] once at shutdown.  Two sinks ship with the crate:
//!
//! - [`LogSink`] logs every metric set at info level.
//! - [`ArchiveSink`] wraps another sink and, on export, writes the retained
//!   history to `ica_recording_<YYYYmmdd_HHMMSS>.json`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nalgebra::DMatrix;
use serde::Serialize;

use crate::audio::AnalysisWindow;
use crate::config::paths;
use crate::metrics::MetricSet;
use crate::separation::SeparatedSignals;

// ---------------------------------------------------------------------------
// CycleOutput
// ---------------------------------------------------------------------------

/// Everything produced by one successful analysis cycle.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub cycle: u64,
    pub window: AnalysisWindow,
    pub separated: SeparatedSignals,
    pub metrics: MetricSet,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub cycle: u64,
    pub window: AnalysisWindow,
    pub separated: SeparatedSignals,
}

/// (window, separated) pairs retained for the end-of-run export, oldest
/// first.  With a limit set, the oldest entry is evicted once full.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    limit: Option<usize>,
}

impl History {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.limit == Some(0) {
            return;
        }
        if let Some(limit) = self.limit {
            while self.entries.len() >= limit {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Sink trait
// ---------------------------------------------------------------------------

pub trait Sink: Send {
    /// Receive one cycle's results.  Must return quickly.
    fn present(&mut self, output: &CycleOutput);

    /// Persist the run's history.  Returns the written path, if any.
    fn export(&mut self, history: &History) -> Result<Option<PathBuf>>;
}

// Compile-time assertion: Box<dyn Sink> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Sink>) {}
};

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Logs each cycle's metrics.
#[derive(Debug, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn present(&mut self, output: &CycleOutput) {
        log::info!("cycle {}: {}", output.cycle, output.metrics);
    }

    fn export(&mut self, _history: &History) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// ArchiveSink
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ArchiveRecord {
    cycle: u64,
    /// One inner vector per channel.
    window: Vec<Vec<f64>>,
    /// One inner vector per component.
    separated: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct Archive {
    created: String,
    cycles: usize,
    records: Vec<ArchiveRecord>,
}

fn columns(data: &DMatrix<f64>) -> Vec<Vec<f64>> {
    data.column_iter()
        .map(|col| col.iter().copied().collect())
        .collect()
}

/// Forwards cycles to an inner sink and archives the history as JSON.
pub struct ArchiveSink<S> {
    inner: S,
    output_dir: PathBuf,
}

impl<S: Sink> ArchiveSink<S> {
    pub fn new(inner: S, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write_archive(&self, history: &History) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create output directory {}", self.output_dir.display())
        })?;

        let now = chrono::Local::now();
        let path = paths::archive_path(&self.output_dir, &now);

        let archive = Archive {
            created: now.to_rfc3339(),
            cycles: history.len(),
            records: history
                .iter()
                .map(|entry| ArchiveRecord {
                    cycle: entry.cycle,
                    window: columns(entry.window.matrix()),
                    separated: columns(entry.separated.matrix()),
                })
                .collect(),
        };

        let json = serde_json::to_string(&archive)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

impl<S: Sink> Sink for ArchiveSink<S> {
    fn present(&mut self, output: &CycleOutput) {
        self.inner.present(output);
    }

    fn export(&mut self, history: &History) -> Result<Option<PathBuf>> {
        if let Err(e) = self.inner.export(history) {
            log::warn!("inner sink export failed: {e:#}");
        }
        if history.is_empty() {
            log::info!("no cycles recorded, nothing to archive");
            return Ok(None);
        }

        let path = self.write_archive(history)?;
        log::info!("archived {} cycles to {}", history.len(), path.display());
        Ok(Some(path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
