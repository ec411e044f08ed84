//! Plain-text diagnostic log.

use crate::Result;
use modex_core::Window;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Records one line per produced output and per skipped window.
///
/// Output lines hold the output path and its good-frame count. Skipped
/// windows are written as `# skipped <id> <start> <end>: <reason>`.
pub struct DiagnosticLog {
    writer: BufWriter<File>,
}

impl DiagnosticLog {
    /// Creates (or truncates) a diagnostic log.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Records a materialised output.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn record_output(&mut self, output: &Path, good_frames: i32) -> Result<()> {
        writeln!(self.writer, "{} {good_frames}", output.display())?;
        Ok(())
    }

    /// Records a window that produced no output.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn record_skipped(&mut self, window: &Window, reason: &str) -> Result<()> {
        writeln!(
            self.writer,
            "# skipped {} {:.3} {:.3}: {reason}",
            window.id(),
            window.start(),
            window.end()
        )?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
