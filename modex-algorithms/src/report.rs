//! Partition results.

use modex_core::Window;
use modex_io::{DiagnosticLog, Result};
use std::fmt;
use std::path::PathBuf;

/// One materialised slice.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    /// Output container path.
    pub path: PathBuf,
    /// Slice window.
    pub window: Window,
    /// Good frames written to the output.
    pub good_frames: i32,
}

/// Why a window produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No run holds either endpoint, even after adjacent-run fallback.
    Incomplete,
    /// The data stream moved past the window without reaching it.
    NoFrames,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "no run covers the window"),
            Self::NoFrames => write!(f, "no frames fall inside the window"),
        }
    }
}

/// A window that produced no output.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedWindow {
    /// The window.
    pub window: Window,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Outputs and skipped windows of a partition pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionReport {
    /// Materialised slices, in the order they were written.
    pub outputs: Vec<OutputRecord>,
    /// Skipped windows.
    pub skipped: Vec<SkippedWindow>,
}

impl PartitionReport {
    /// Appends another report.
    pub fn extend(&mut self, other: PartitionReport) {
        self.outputs.extend(other.outputs);
        self.skipped.extend(other.skipped);
    }

    /// Records a skipped window.
    pub fn skip(&mut self, window: Window, reason: SkipReason) {
        self.skipped.push(SkippedWindow { window, reason });
    }

    /// Total good frames over every output.
    #[must_use]
    pub fn total_good_frames(&self) -> i64 {
        self.outputs.iter().map(|o| i64::from(o.good_frames)).sum()
    }

    /// Writes one diagnostic line per output and per skipped window.
    ///
    /// # Errors
    /// Returns an error if the log cannot be written.
    pub fn write_diagnostics(&self, log: &mut DiagnosticLog) -> Result<()> {
        for output in &self.outputs {
            log.record_output(&output.path, output.good_frames)?;
        }
        for skipped in &self.skipped {
            log.record_skipped(&skipped.window, &skipped.reason.to_string())?;
        }
        log.flush()
    }
}
