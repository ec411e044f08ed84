//! Writing finished slices into their output containers.

use crate::report::OutputRecord;
use crate::slices::Slice;
use log::info;
use modex_io::nexus;
use modex_io::{ContainerStore, Result};

/// Persists slice results into templated output containers.
///
/// Only the good-frame count, the monitor counts and the detector counts are
/// overwritten; every other templated dataset is left as copied.
pub struct OutputMaterializer<'a, S: ContainerStore> {
    store: &'a S,
}

impl<'a, S: ContainerStore> OutputMaterializer<'a, S> {
    /// Creates a materialiser writing through `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Writes one slice.
    ///
    /// # Errors
    /// Returns an error if a dataset is missing from the output or has the
    /// wrong size.
    pub fn write(&self, slice: &Slice) -> Result<OutputRecord> {
        let output = slice.output();
        info!(
            "Writing data to output '{}' for slice '{}'",
            output.display(),
            slice.window().id()
        );

        self.store
            .write_i32(output, nexus::GOOD_FRAMES, &[slice.detector_frames()])?;

        for (&index, counts) in slice.monitors() {
            let rounded: Vec<i32> = counts.iter().map(|&c| round_count(c)).collect();
            self.store
                .write_i32(output, &nexus::monitor_data_path(index), &rounded)?;
        }

        let counts: Vec<i32> = slice
            .histograms()
            .counts()
            .iter()
            .map(|&c| i32::try_from(c).unwrap_or(i32::MAX))
            .collect();
        self.store.write_i32(output, nexus::DETECTOR_COUNTS, &counts)?;

        Ok(OutputRecord {
            path: output.to_path_buf(),
            window: slice.window().clone(),
            good_frames: slice.detector_frames(),
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_count(value: f64) -> i32 {
    value.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}
