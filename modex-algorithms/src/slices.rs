//! Slices and slice sets.
//!
//! A window is split into equal slices, each accumulating into its own
//! output container templated from a reference run.

use log::{debug, info, warn};
use modex_core::{HistogramBank, Window};
use modex_io::nexus::{self, ContainerLayout};
use modex_io::{ContainerStore, Result, RunFile};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Output container path for slice `index` (0-based) of `n_slices`.
///
/// The name is `<id>-<int(start)>.nxs`, with a zero-padded 1-based slice
/// number appended when the window has more than one slice.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn output_path(output_dir: &Path, window: &Window, index: usize, n_slices: usize) -> PathBuf {
    let start = window.start().trunc() as i64;
    let name = if n_slices > 1 {
        format!("{}-{start}-{:03}.nxs", window.id(), index + 1)
    } else {
        format!("{}-{start}.nxs", window.id())
    };
    output_dir.join(name)
}

/// Accumulation state of one slice.
#[derive(Debug, Clone)]
pub struct Slice {
    window: Window,
    output: PathBuf,
    histograms: HistogramBank,
    detector_frames: i32,
    pending_frames: usize,
    monitors: BTreeMap<u32, Vec<f64>>,
    monitor_frames: f64,
}

impl Slice {
    /// Creates a zeroed slice for the given container layout.
    ///
    /// # Errors
    /// Returns an error if the layout's spectra or bin edges are invalid.
    pub fn new(window: Window, output: PathBuf, layout: &ContainerLayout) -> Result<Self> {
        let histograms = HistogramBank::new(layout.spectra.clone(), layout.tof_edges.clone())?;
        let monitors = layout
            .monitors
            .iter()
            .map(|(&index, &len)| (index, vec![0.0; len]))
            .collect();
        Ok(Self {
            window,
            output,
            histograms,
            detector_frames: 0,
            pending_frames: 0,
            monitors,
            monitor_frames: 0.0,
        })
    }

    /// Slice window.
    #[must_use]
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Output container path.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Detector histograms.
    #[must_use]
    pub fn histograms(&self) -> &HistogramBank {
        &self.histograms
    }

    /// Frames whose events were binned into this slice.
    #[must_use]
    pub fn detector_frames(&self) -> i32 {
        self.detector_frames
    }

    /// Good frames represented by the accumulated monitor counts.
    #[must_use]
    pub fn monitor_frames(&self) -> f64 {
        self.monitor_frames
    }

    /// Accumulated monitor counts by monitor index.
    #[must_use]
    pub fn monitors(&self) -> &BTreeMap<u32, Vec<f64>> {
        &self.monitors
    }

    /// Frames received from the current run and not yet reflected in the monitors.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.pending_frames
    }

    /// Bins every detector event of `frame`. Events with an id of zero or
    /// below belong to no detector and are skipped.
    pub fn record_frame(&mut self, run: &RunFile, frame: usize) {
        for event in run.frame_events(frame) {
            let id = run.event_ids[event];
            if id > 0 {
                self.histograms.fill(id, run.event_offsets[event]);
            }
        }
        self.detector_frames += 1;
        self.pending_frames += 1;
    }

    /// Adds this slice's share of the run's monitor counts.
    ///
    /// The share is the fraction of the run's frames that this slice
    /// received since the last flush. The monitor frame count grows by the
    /// same fraction of the run's good frames.
    #[allow(clippy::cast_precision_loss)]
    pub fn flush_monitors(&mut self, run: &RunFile) {
        if self.pending_frames == 0 {
            return;
        }
        let fraction = self.pending_frames as f64 / run.n_frames() as f64;
        debug!(
            "Slice {} takes {:.4} of monitors from {}",
            self.window.id(),
            fraction,
            run.span.path.display()
        );
        for (index, counts) in &run.monitors {
            match self.monitors.get_mut(index) {
                Some(target) if target.len() == counts.len() => {
                    for (total, &count) in target.iter_mut().zip(counts) {
                        *total += f64::from(count) * fraction;
                    }
                }
                _ => warn!(
                    "Monitor {index} of {} does not match the output layout; ignored",
                    run.span.path.display()
                ),
            }
        }
        self.monitor_frames += f64::from(run.good_frames) * fraction;
        self.pending_frames = 0;
    }

    /// Multiplies every monitor count and the monitor frame count by `factor`.
    pub fn scale_monitors(&mut self, factor: f64) {
        for counts in self.monitors.values_mut() {
            for count in counts {
                *count *= factor;
            }
        }
        self.monitor_frames *= factor;
    }

    /// Multiplies every detector count and the detector frame count by
    /// `factor`, rounding to whole counts.
    #[allow(clippy::cast_possible_truncation)]
    pub fn scale_detectors(&mut self, factor: f64) {
        self.histograms.scale(factor);
        self.detector_frames = (f64::from(self.detector_frames) * factor).round() as i32;
    }

    pub(crate) fn shift(&mut self, delta: f64) {
        self.window.shift(delta);
    }
}

/// The slices of one window, in time order.
#[derive(Debug, Clone)]
pub struct SliceSet {
    slices: Vec<Slice>,
}

impl SliceSet {
    /// Number of slices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Returns true if the set has no slices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Slices, in time order.
    #[must_use]
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Mutable access to the slices.
    pub fn slices_mut(&mut self) -> &mut [Slice] {
        &mut self.slices
    }

    /// Moves every slice window forward by `delta` seconds.
    pub fn shift(&mut self, delta: f64) {
        for slice in &mut self.slices {
            slice.shift(delta);
        }
    }

    /// Consumes the set, returning its slices.
    #[must_use]
    pub fn into_slices(self) -> Vec<Slice> {
        self.slices
    }
}

/// Creates slice sets templated from a reference run.
#[derive(Debug, Clone)]
pub struct SliceSetFactory {
    reference: PathBuf,
    template: Vec<String>,
    layout: ContainerLayout,
    output_dir: PathBuf,
    n_slices: usize,
}

impl SliceSetFactory {
    /// Reads the template paths and layout of `reference`.
    ///
    /// # Errors
    /// Returns an error if `n_slices` is zero or the reference cannot be read.
    pub fn new<S: ContainerStore>(
        store: &S,
        reference: &Path,
        output_dir: &Path,
        n_slices: usize,
    ) -> Result<Self> {
        if n_slices == 0 {
            return Err(modex_io::Error::config("slice count must be at least 1"));
        }
        let container = store.open(reference)?;
        let template = nexus::template_paths(&container);
        let layout = ContainerLayout::read(&container)?;
        info!(
            "Templating outputs from {} ({} spectra, {} bins, {} monitors)",
            reference.display(),
            layout.spectra.len(),
            layout.n_bins(),
            layout.monitors.len()
        );
        Ok(Self {
            reference: reference.to_path_buf(),
            template,
            layout,
            output_dir: output_dir.to_path_buf(),
            n_slices,
        })
    }

    /// Splits `window` and templates one output container per slice.
    ///
    /// # Errors
    /// Returns an error if an output cannot be templated.
    pub fn create<S: ContainerStore>(&self, store: &S, window: &Window) -> Result<SliceSet> {
        let mut slices = Vec::with_capacity(self.n_slices);
        for (index, slice_window) in window.split(self.n_slices)?.into_iter().enumerate() {
            let output = output_path(&self.output_dir, window, index, self.n_slices);
            store.template_to(&self.reference, &output, &self.template)?;
            slices.push(Slice::new(slice_window, output, &self.layout)?);
        }
        debug!("Prepared {} slices for window {window}", slices.len());
        Ok(SliceSet { slices })
    }
}
