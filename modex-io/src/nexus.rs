//! ISIS NeXus (`raw_data_1`) layout and run loading.

use crate::store::{ContainerStore, DatasetReader};
use crate::{Error, Result};
use log::debug;
use modex_core::parse_timestamp;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const TITLE: &str = "/raw_data_1/title";
pub const USER_NAME: &str = "/raw_data_1/user_1/name";
pub const START_TIME: &str = "/raw_data_1/start_time";
pub const END_TIME: &str = "/raw_data_1/end_time";
pub const GOOD_FRAMES: &str = "/raw_data_1/good_frames";
pub const RAW_FRAMES: &str = "/raw_data_1/raw_frames";
pub const DETECTOR_COUNTS: &str = "/raw_data_1/detector_1/counts";
pub const SPECTRUM_INDEX: &str = "/raw_data_1/detector_1/spectrum_index";
pub const TIME_OF_FLIGHT: &str = "/raw_data_1/detector_1/time_of_flight";
pub const EVENT_ID: &str = "/raw_data_1/detector_1_events/event_id";
pub const EVENT_TIME_OFFSET: &str = "/raw_data_1/detector_1_events/event_time_offset";
pub const EVENT_TIME_ZERO: &str = "/raw_data_1/detector_1_events/event_time_zero";
pub const EVENT_INDEX: &str = "/raw_data_1/detector_1_events/event_index";
pub const EVENTS_PER_FRAME: &str = "/raw_data_1/framelog/events_log/value";

/// Metadata datasets copied into every output container.
pub const BASIC_TEMPLATE: [&str; 9] = [
    TITLE,
    USER_NAME,
    START_TIME,
    END_TIME,
    GOOD_FRAMES,
    RAW_FRAMES,
    DETECTOR_COUNTS,
    SPECTRUM_INDEX,
    TIME_OF_FLIGHT,
];

/// Path of the counts of monitor `index` (1-based).
#[must_use]
pub fn monitor_data_path(index: u32) -> String {
    format!("/raw_data_1/monitor_{index}/data")
}

/// Path of the bin edges of monitor `index`.
#[must_use]
pub fn monitor_tof_path(index: u32) -> String {
    format!("/raw_data_1/monitor_{index}/time_of_flight")
}

/// Indices of the monitors present, counting up from 1 until one is absent.
pub fn monitor_indices<H: DatasetReader>(container: &H) -> Vec<u32> {
    (1..)
        .take_while(|&index| container.contains(&monitor_data_path(index)))
        .collect()
}

/// Datasets to copy from a reference container into an output skeleton.
pub fn template_paths<H: DatasetReader>(reference: &H) -> Vec<String> {
    BASIC_TEMPLATE
        .iter()
        .map(|path| (*path).to_string())
        .chain(monitor_indices(reference).into_iter().map(monitor_data_path))
        .collect()
}

fn read_span<H: DatasetReader>(container: &H) -> Result<(i64, i64)> {
    let start = parse_timestamp(&container.read_string(START_TIME)?)?;
    let end = parse_timestamp(&container.read_string(END_TIME)?)?;
    if start > end {
        return Err(Error::InvalidFormat(format!(
            "{} ends before it starts",
            container.path().display()
        )));
    }
    Ok((start, end))
}

/// The `[start, end)` epoch span of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpan {
    pub path: PathBuf,
    pub start_epoch: i64,
    pub end_epoch: i64,
}

impl RunSpan {
    /// Reads only the start and end timestamps of a run.
    ///
    /// # Errors
    /// Returns an error if the container or its timestamps are missing or
    /// malformed, or if the run ends before it starts.
    pub fn load<S: ContainerStore>(store: &S, path: &Path) -> Result<Self> {
        let container = store.open(path)?;
        let (start_epoch, end_epoch) = read_span(&container)?;
        Ok(Self {
            path: path.to_path_buf(),
            start_epoch,
            end_epoch,
        })
    }

    /// Returns true if `time` lies in `[start_epoch, end_epoch)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_epoch as f64 && time < self.end_epoch as f64
    }

    /// Run duration in seconds.
    #[must_use]
    pub fn duration(&self) -> i64 {
        self.end_epoch - self.start_epoch
    }
}

/// Spectrum list, TOF edges and monitor layout of a reference container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerLayout {
    pub spectra: Vec<i32>,
    pub tof_edges: Vec<f64>,
    /// Monitor index to number of values.
    pub monitors: BTreeMap<u32, usize>,
}

impl ContainerLayout {
    /// Reads the layout from an open container.
    ///
    /// # Errors
    /// Returns an error if the spectrum list, TOF edges or a monitor is missing.
    pub fn read<H: DatasetReader>(container: &H) -> Result<Self> {
        let spectra = container.read_i32(SPECTRUM_INDEX)?;
        let tof_edges = container.read_f64(TIME_OF_FLIGHT)?;
        if tof_edges.len() < 2 {
            return Err(Error::InvalidFormat(format!(
                "{} has fewer than two TOF bin edges",
                container.path().display()
            )));
        }
        let mut monitors = BTreeMap::new();
        for index in monitor_indices(container) {
            let len = container.read_i32(&monitor_data_path(index))?.len();
            monitors.insert(index, len);
        }
        Ok(Self {
            spectra,
            tof_edges,
            monitors,
        })
    }

    /// Number of TOF bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.tof_edges.len().saturating_sub(1)
    }
}

/// A run with its event stream and monitor counts loaded.
#[derive(Debug, Clone)]
pub struct RunFile {
    pub span: RunSpan,
    pub good_frames: i32,
    pub raw_frames: i32,
    /// Detector id per event.
    pub event_ids: Vec<i32>,
    /// Time offset within the frame per event, in microseconds.
    pub event_offsets: Vec<f64>,
    /// Frame zero time per frame, in seconds since the run start.
    pub frame_offsets: Vec<f64>,
    /// Number of events per frame.
    pub events_per_frame: Vec<i32>,
    pub tof_edges: Vec<f64>,
    pub monitors: BTreeMap<u32, Vec<i32>>,
    frame_starts: Vec<usize>,
}

impl RunFile {
    /// Opens a run and loads its frames, events and monitors.
    ///
    /// Per-frame event counts are read from the frame log. Containers without
    /// one fall back to the per-frame event index.
    ///
    /// # Errors
    /// Returns an error if a required dataset is missing or the event
    /// structure is inconsistent.
    pub fn load<S: ContainerStore>(store: &S, path: &Path) -> Result<Self> {
        let container = store.open(path)?;
        let (start_epoch, end_epoch) = read_span(&container)?;
        let span = RunSpan {
            path: path.to_path_buf(),
            start_epoch,
            end_epoch,
        };

        let event_ids = container.read_i32(EVENT_ID)?;
        let event_offsets = container.read_f64(EVENT_TIME_OFFSET)?;
        let frame_offsets = container.read_f64(EVENT_TIME_ZERO)?;
        let events_per_frame = if container.contains(EVENTS_PER_FRAME) {
            container.read_i32(EVENTS_PER_FRAME)?
        } else {
            debug!("{} has no frame log; using the event index", path.display());
            counts_from_index(&container.read_i32(EVENT_INDEX)?, event_ids.len())?
        };

        let mut monitors = BTreeMap::new();
        for index in monitor_indices(&container) {
            monitors.insert(index, container.read_i32(&monitor_data_path(index))?);
        }

        debug!(
            "Loaded {}: {} events in {} frames, {} monitors",
            path.display(),
            event_ids.len(),
            events_per_frame.len(),
            monitors.len()
        );
        Self::from_parts(
            span,
            container.read_i32_scalar(GOOD_FRAMES)?,
            container.read_i32_scalar(RAW_FRAMES)?,
            event_ids,
            event_offsets,
            frame_offsets,
            events_per_frame,
            container.read_f64(TIME_OF_FLIGHT)?,
            monitors,
        )
    }

    /// Builds a run from loaded arrays, validating the event structure.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if a per-frame count is negative or
    /// the array lengths are inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        span: RunSpan,
        good_frames: i32,
        raw_frames: i32,
        event_ids: Vec<i32>,
        event_offsets: Vec<f64>,
        frame_offsets: Vec<f64>,
        events_per_frame: Vec<i32>,
        tof_edges: Vec<f64>,
        monitors: BTreeMap<u32, Vec<i32>>,
    ) -> Result<Self> {
        let name = span.path.display().to_string();
        if frame_offsets.len() != events_per_frame.len() {
            return Err(Error::InvalidFormat(format!(
                "{name}: {} frame times but {} frame event counts",
                frame_offsets.len(),
                events_per_frame.len()
            )));
        }
        if event_ids.len() != event_offsets.len() {
            return Err(Error::InvalidFormat(format!(
                "{name}: {} event ids but {} event time offsets",
                event_ids.len(),
                event_offsets.len()
            )));
        }

        let mut frame_starts = Vec::with_capacity(events_per_frame.len() + 1);
        let mut total = 0usize;
        frame_starts.push(0);
        for (frame, &count) in events_per_frame.iter().enumerate() {
            let count = usize::try_from(count).map_err(|_| {
                Error::InvalidFormat(format!(
                    "{name}: frame {frame} has negative event count {count}"
                ))
            })?;
            total += count;
            frame_starts.push(total);
        }
        if total != event_ids.len() {
            return Err(Error::InvalidFormat(format!(
                "{name}: frames hold {total} events but {} were recorded",
                event_ids.len()
            )));
        }

        Ok(Self {
            span,
            good_frames,
            raw_frames,
            event_ids,
            event_offsets,
            frame_offsets,
            events_per_frame,
            tof_edges,
            monitors,
            frame_starts,
        })
    }

    /// Number of frames with event data.
    #[must_use]
    pub fn n_frames(&self) -> usize {
        self.events_per_frame.len()
    }

    /// Number of events.
    #[must_use]
    pub fn n_events(&self) -> usize {
        self.event_ids.len()
    }

    /// Event index range of frame `frame`.
    #[must_use]
    pub fn frame_events(&self, frame: usize) -> Range<usize> {
        self.frame_starts[frame]..self.frame_starts[frame + 1]
    }

    /// Absolute frame zero time of frame `frame`, in epoch seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frame_zero(&self, frame: usize) -> f64 {
        self.frame_offsets[frame] + self.span.start_epoch as f64
    }
}

/// Converts per-frame start indices into per-frame counts.
fn counts_from_index(index: &[i32], n_events: usize) -> Result<Vec<i32>> {
    let n_events = i32::try_from(n_events)
        .map_err(|_| Error::InvalidFormat(format!("{n_events} events exceed the index range")))?;
    index
        .iter()
        .enumerate()
        .map(|(frame, &start)| {
            let end = index.get(frame + 1).copied().unwrap_or(n_events);
            if end < start {
                Err(Error::InvalidFormat(format!(
                    "event index decreases at frame {frame}"
                )))
            } else {
                Ok(end - start)
            }
        })
        .collect()
}
