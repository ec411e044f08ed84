//! Event, histogram and monitor dumps of individual runs.

use log::info;
use modex_io::nexus::{self, ContainerLayout};
use modex_io::{ContainerStore, DatasetReader, Error, Result, RunFile};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

const MICROSECONDS: f64 = 1.0e-6;

fn suffixed(input: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<input>.events.<detector>`
#[must_use]
pub fn events_dump_path(input: &Path, detector: usize) -> PathBuf {
    suffixed(input, &format!(".events.{detector}"))
}

/// `<input>.<spectrum>`
#[must_use]
pub fn detector_dump_path(input: &Path, spectrum: i32) -> PathBuf {
    suffixed(input, &format!(".{spectrum}"))
}

/// `<input>.mon.<monitor>`
#[must_use]
pub fn monitor_dump_path(input: &Path, monitor: u32) -> PathBuf {
    suffixed(input, &format!(".mon.{monitor}"))
}

/// `<input>.spectra.nxs`
#[must_use]
pub fn spectra_export_path(input: &Path) -> PathBuf {
    suffixed(input, ".spectra.nxs")
}

/// Spectrum id of a 1-based detector index.
fn spectrum_for_detector(spectra: &[i32], detector: usize) -> Result<i32> {
    detector
        .checked_sub(1)
        .and_then(|row| spectra.get(row))
        .copied()
        .ok_or_else(|| {
            Error::config(format!(
                "detector index {detector} is outside 1..={}",
                spectra.len()
            ))
        })
}

/// Writes every event of the spectrum behind 1-based `detector` index.
///
/// Each line holds the time offset within the frame (us), the time since
/// the run start (s), the epoch time (s) and, after the first event, the
/// time since the previous event (s). Returns the number of events written.
///
/// # Errors
/// Returns an error if the run cannot be loaded, the detector index is out
/// of range, or the write fails.
#[allow(clippy::cast_precision_loss)]
pub fn dump_events<S: ContainerStore, W: Write>(
    store: &S,
    input: &Path,
    detector: usize,
    out: &mut W,
) -> Result<usize> {
    let spectra = store.open(input)?.read_i32(nexus::SPECTRUM_INDEX)?;
    let spectrum = spectrum_for_detector(&spectra, detector)?;
    info!("Spectrum id for detector index {detector} in {} is {spectrum}", input.display());

    let run = RunFile::load(store, input)?;
    let start = run.span.start_epoch as f64;
    writeln!(
        out,
        "# {:20}  {:20}  {:20}  delta(s)",
        "frame_offset(us)", "start_time_offset(s)", "epoch_offset(s)"
    )?;

    let mut last: Option<f64> = None;
    let mut written = 0usize;
    for frame in 0..run.n_frames() {
        let frame_offset = run.frame_offsets[frame];
        for event in run.frame_events(frame) {
            if run.event_ids[event] != spectrum {
                continue;
            }
            let micros = run.event_offsets[event];
            let relative = micros * MICROSECONDS + frame_offset;
            let epoch = relative + start;
            match last {
                Some(previous) => writeln!(
                    out,
                    "{micros:20.6}  {relative:20.10}  {epoch:20.5}  {}",
                    epoch - previous
                )?,
                None => writeln!(out, "{micros:20.6}  {relative:20.10}  {epoch:20.5}")?,
            }
            last = Some(epoch);
            written += 1;
        }
    }
    Ok(written)
}

fn write_histogram<W: Write>(out: &mut W, edges: &[f64], counts: &[i32]) -> Result<()> {
    for (edge, count) in edges.iter().zip(counts) {
        writeln!(out, "{edge}  {count}")?;
    }
    Ok(())
}

/// Writes the stored histogram of `spectrum` as `tof count` lines, one per
/// bin, keyed by the lower bin edge.
///
/// # Errors
/// Returns an error if the spectrum is not part of the run or the write fails.
pub fn dump_detector<S: ContainerStore, W: Write>(
    store: &S,
    input: &Path,
    spectrum: i32,
    out: &mut W,
) -> Result<()> {
    let container = store.open(input)?;
    let layout = ContainerLayout::read(&container)?;
    let row = layout
        .spectra
        .iter()
        .position(|&s| s == spectrum)
        .ok_or_else(|| Error::config(format!("spectrum {spectrum} is not in {}", input.display())))?;
    let counts = container.read_i32(nexus::DETECTOR_COUNTS)?;
    let n_bins = layout.n_bins();
    let spectrum_counts = counts.get(row * n_bins..(row + 1) * n_bins).ok_or_else(|| {
        Error::InvalidFormat(format!(
            "detector counts of {} are shorter than the spectrum list",
            input.display()
        ))
    })?;
    write_histogram(out, &layout.tof_edges, spectrum_counts)
}

/// Writes monitor `monitor` as `tof count` lines under a `# TCB/usec   Counts`
/// header. The monitor's own bin edges are used when present.
///
/// # Errors
/// Returns an error if the monitor is not part of the run or the write fails.
pub fn dump_monitor<S: ContainerStore, W: Write>(
    store: &S,
    input: &Path,
    monitor: u32,
    out: &mut W,
) -> Result<()> {
    let container = store.open(input)?;
    let counts = container.read_i32(&nexus::monitor_data_path(monitor))?;
    let tof_path = nexus::monitor_tof_path(monitor);
    let edges = if container.contains(&tof_path) {
        container.read_f64(&tof_path)?
    } else {
        container.read_f64(nexus::TIME_OF_FLIGHT)?
    };
    writeln!(out, "# TCB/usec   Counts")?;
    write_histogram(out, &edges, &counts)
}

/// Collects event times (seconds since the run start) of every spectrum in
/// `lower..=upper` and writes them to `dest`, one dataset per spectrum
/// under `/spectra/<id>`. Returns the number of events exported.
///
/// # Errors
/// Returns a configuration error if `lower > upper`, or an error if the run
/// cannot be loaded or the output cannot be created.
pub fn export_spectra<S: ContainerStore>(
    store: &S,
    input: &Path,
    lower: i32,
    upper: i32,
    dest: &Path,
) -> Result<usize> {
    if lower > upper {
        return Err(Error::config(format!(
            "spectrum range lower bound {lower} exceeds upper bound {upper}"
        )));
    }
    let run = RunFile::load(store, input)?;
    let span = usize::try_from(i64::from(upper) - i64::from(lower) + 1)
        .map_err(|_| Error::config("spectrum range is too large"))?;
    let mut times: Vec<Vec<f64>> = vec![Vec::new(); span];

    for frame in 0..run.n_frames() {
        let frame_offset = run.frame_offsets[frame];
        for event in run.frame_events(frame) {
            let id = run.event_ids[event];
            if id < lower || id > upper {
                continue;
            }
            if let Ok(slot) = usize::try_from(id - lower) {
                times[slot].push(run.event_offsets[event] * MICROSECONDS + frame_offset);
            }
        }
    }

    let exported = times.iter().map(Vec::len).sum();
    let datasets: Vec<(String, Vec<f64>)> = (lower..=upper)
        .zip(times)
        .map(|(id, values)| (format!("/spectra/{id}"), values))
        .collect();
    store.create_f64_datasets(dest, &datasets)?;
    info!(
        "Exported {exported} events of spectra {lower}..={upper} from {} to {}",
        input.display(),
        dest.display()
    );
    Ok(exported)
}
