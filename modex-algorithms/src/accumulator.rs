//! Streaming accumulation of run frames into window slices.
//!
//! The accumulator walks the frames of each run in time order against a
//! cursor over the slices of the active window. Both streams only move
//! forwards: runs must arrive in start-time order and windows in start-time
//! order without overlap.

use crate::materialize::OutputMaterializer;
use crate::postprocess::PostProcessor;
use crate::report::{PartitionReport, SkipReason};
use crate::slices::{SliceSet, SliceSetFactory};
use log::{debug, info, warn};
use modex_core::{PostProcessingMode, Window};
use modex_io::{ContainerStore, Error, Result, RunFile};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// What happens once every slice of the active set lies behind the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlicePolicy {
    /// Write the set out and start a new one for the next window.
    #[default]
    Individual,
    /// Shift the same set forward by the repeat delta and keep summing.
    Summed,
}

/// The sequence of windows to accumulate.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowSchedule {
    /// One window repeated every `delta` seconds.
    Periodic {
        /// First occurrence.
        window: Window,
        /// Seconds between occurrences.
        delta: f64,
    },
    /// A finite list of windows in start-time order.
    Explicit(VecDeque<Window>),
}

impl WindowSchedule {
    /// A window repeated every `delta` seconds, starting `offset` seconds
    /// after `window.start()`.
    ///
    /// # Errors
    /// Returns a configuration error if `delta` is not positive, `offset` is
    /// negative, or the window width plus offset exceeds `delta`.
    pub fn periodic(mut window: Window, offset: f64, delta: f64) -> Result<Self> {
        if !delta.is_finite() || delta <= 0.0 {
            return Err(Error::config(format!(
                "window delta must be positive, got {delta}"
            )));
        }
        if !offset.is_finite() || offset < 0.0 {
            return Err(Error::config(format!(
                "window offset must not be negative, got {offset}"
            )));
        }
        if window.duration() + offset > delta {
            return Err(Error::config(format!(
                "window width ({}) plus offset ({offset}) exceeds window delta ({delta})",
                window.duration()
            )));
        }
        window.shift(offset);
        Ok(Self::Periodic { window, delta })
    }

    /// An explicit list of windows.
    ///
    /// # Errors
    /// Returns a configuration error if the windows are unsorted or overlap.
    pub fn explicit(windows: Vec<Window>) -> Result<Self> {
        if let Some(pair) = windows
            .windows(2)
            .find(|w| w[1].start() < w[0].start() || w[0].overlaps(&w[1]))
        {
            return Err(Error::config(format!(
                "windows {} and {} are out of order or overlap",
                pair[0], pair[1]
            )));
        }
        Ok(Self::Explicit(windows.into()))
    }

    /// Moves every window of the schedule by `seconds`.
    pub fn shift(&mut self, seconds: f64) {
        match self {
            Self::Periodic { window, .. } => window.shift(seconds),
            Self::Explicit(queue) => {
                for window in queue {
                    window.shift(seconds);
                }
            }
        }
    }

    fn delta(&self) -> Option<f64> {
        match self {
            Self::Periodic { delta, .. } => Some(*delta),
            Self::Explicit(_) => None,
        }
    }
}

/// Output and slicing options shared by every window.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorOptions {
    /// Directory receiving output containers.
    pub output_dir: PathBuf,
    /// Slices per window.
    pub slices: usize,
    /// Slice reuse policy.
    pub policy: SlicePolicy,
    /// Renormalisation applied before writing.
    pub post_processing: PostProcessingMode,
}

impl AccumulatorOptions {
    /// Options writing to `output_dir` with one slice per window, the
    /// individual policy and no post-processing.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            slices: 1,
            policy: SlicePolicy::Individual,
            post_processing: PostProcessingMode::None,
        }
    }

    /// Set the number of slices per window.
    #[must_use]
    pub fn with_slices(mut self, slices: usize) -> Self {
        self.slices = slices;
        self
    }

    /// Set the slice reuse policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SlicePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the post-processing mode.
    #[must_use]
    pub fn with_post_processing(mut self, mode: PostProcessingMode) -> Self {
        self.post_processing = mode;
        self
    }
}

/// Merge engine over the run stream and the window stream.
pub struct StreamAccumulator<'a, S: ContainerStore> {
    store: &'a S,
    factory: SliceSetFactory,
    schedule: WindowSchedule,
    policy: SlicePolicy,
    post: PostProcessor,
    active: Option<SliceSet>,
    cursor: usize,
    exhausted: bool,
    last_frame_zero: f64,
    report: PartitionReport,
}

impl<'a, S: ContainerStore> StreamAccumulator<'a, S> {
    /// Creates an accumulator templating outputs from `reference`.
    ///
    /// With the summed policy the single slice set is created immediately.
    ///
    /// # Errors
    /// Returns a configuration error for the summed policy with an explicit
    /// schedule, or an error if the reference cannot be read.
    pub fn new(
        store: &'a S,
        reference: &Path,
        schedule: WindowSchedule,
        options: &AccumulatorOptions,
    ) -> Result<Self> {
        let factory = SliceSetFactory::new(store, reference, &options.output_dir, options.slices)?;
        let active = match (options.policy, &schedule) {
            (SlicePolicy::Summed, WindowSchedule::Periodic { window, .. }) => {
                Some(factory.create(store, window)?)
            }
            (SlicePolicy::Summed, WindowSchedule::Explicit(_)) => {
                return Err(Error::config(
                    "summed accumulation requires a periodic window",
                ))
            }
            (SlicePolicy::Individual, _) => None,
        };
        Ok(Self {
            store,
            factory,
            schedule,
            policy: options.policy,
            post: PostProcessor::new(options.post_processing),
            active,
            cursor: 0,
            exhausted: false,
            last_frame_zero: f64::NEG_INFINITY,
            report: PartitionReport::default(),
        })
    }

    /// Returns true once an explicit schedule has run out of windows.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Accumulates every frame of `run`.
    ///
    /// On return the run's monitor counts have been shared out to every
    /// slice that received frames from it, so the run can be dropped.
    ///
    /// # Errors
    /// Returns an error if an output cannot be templated or written.
    pub fn process_run(&mut self, run: &RunFile) -> Result<()> {
        let mut binned = 0usize;
        for frame in 0..run.n_frames() {
            let frame_zero = run.frame_zero(frame);
            let previous = std::mem::replace(&mut self.last_frame_zero, frame_zero);
            if frame_zero < previous {
                warn!(
                    "Frame {frame} of {} is earlier than the previous frame; runs must be time ordered",
                    run.span.path.display()
                );
            }

            self.advance(run, frame_zero)?;
            if self.active.is_none() {
                if !self.open_next(previous, frame_zero)? {
                    self.exhausted = true;
                    break;
                }
                // The new window may have started before this frame.
                self.advance(run, frame_zero)?;
            }

            if let Some(set) = self.active.as_mut() {
                let slice = &mut set.slices_mut()[self.cursor];
                if slice.window().contains(frame_zero) {
                    slice.record_frame(run, frame);
                    binned += 1;
                }
            }
        }

        if let Some(set) = self.active.as_mut() {
            for slice in set.slices_mut() {
                slice.flush_monitors(run);
            }
        }

        if binned == 0 {
            debug!("Run {} contributed no frames", run.span.path.display());
        } else {
            info!(
                "Binned {binned} of {} frames from {}",
                run.n_frames(),
                run.span.path.display()
            );
        }
        Ok(())
    }

    /// Writes out the remaining slices and returns the report.
    ///
    /// # Errors
    /// Returns an error if an output cannot be written.
    pub fn finish(mut self) -> Result<PartitionReport> {
        if let Some(set) = self.active.take() {
            self.finalize(set, None)?;
        }
        if let WindowSchedule::Explicit(queue) = &mut self.schedule {
            for window in queue.drain(..) {
                debug!("Window {window} was never reached");
                self.report.skip(window, SkipReason::NoFrames);
            }
        }
        Ok(self.report)
    }

    /// Moves the slice cursor past every slice ending at or before `time`.
    fn advance(&mut self, run: &RunFile, time: f64) -> Result<()> {
        let delta = self.schedule.delta();
        loop {
            let Some(set) = self.active.as_mut() else {
                return Ok(());
            };
            if set.slices()[self.cursor].window().end() > time {
                return Ok(());
            }
            self.cursor += 1;
            if self.cursor < set.len() {
                continue;
            }

            self.cursor = 0;
            match (self.policy, delta) {
                (SlicePolicy::Summed, Some(delta)) => {
                    let end = set.slices()[set.len() - 1].window().end();
                    set.shift(periods_past(end, time, delta)? * delta);
                    debug!(
                        "Propagated window forwards, new start time is {:.2}",
                        set.slices()[0].window().start()
                    );
                }
                _ => {
                    if let Some(set) = self.active.take() {
                        self.finalize(set, Some(run))?;
                    }
                }
            }
        }
    }

    /// Opens a slice set for the next window still ending after `time`.
    ///
    /// Windows ending between the `previous` frame and `time` are reported as
    /// skipped. Periodic occurrences ending before the first frame are passed
    /// over silently. Returns false when the schedule has no windows left.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn open_next(&mut self, previous: f64, time: f64) -> Result<bool> {
        let window = match &mut self.schedule {
            WindowSchedule::Periodic { window, delta } => {
                let delta = *delta;
                if window.end() <= time {
                    let periods = periods_past(window.end(), time, delta)?;
                    if previous.is_finite() {
                        for _ in 0..periods as u64 {
                            debug!("Window {window} has no frames");
                            self.report.skip(window.clone(), SkipReason::NoFrames);
                            window.shift(delta);
                        }
                    } else {
                        debug!("Passing over {periods} windows before the first frame");
                        window.shift(periods * delta);
                    }
                    while window.end() <= time {
                        window.shift(delta);
                    }
                }
                let next = window.clone();
                window.shift(delta);
                next
            }
            WindowSchedule::Explicit(queue) => loop {
                match queue.pop_front() {
                    None => return Ok(false),
                    Some(window) if window.end() <= time => {
                        debug!("Window {window} has no frames");
                        self.report.skip(window, SkipReason::NoFrames);
                    }
                    Some(window) => break window,
                }
            },
        };
        info!("Accumulating window {window}");
        self.active = Some(self.factory.create(self.store, &window)?);
        self.cursor = 0;
        Ok(true)
    }

    fn finalize(&mut self, set: SliceSet, run: Option<&RunFile>) -> Result<()> {
        let materializer = OutputMaterializer::new(self.store);
        for mut slice in set.into_slices() {
            if let Some(run) = run {
                slice.flush_monitors(run);
            }
            self.post.apply(&mut slice);
            let record = materializer.write(&slice)?;
            self.report.outputs.push(record);
        }
        Ok(())
    }
}

/// Whole periods of `delta` that move a window ending at `end` past `time`.
///
/// Fails when `delta` is below the floating-point resolution at `end`.
fn periods_past(end: f64, time: f64, delta: f64) -> Result<f64> {
    if end + delta <= end {
        return Err(Error::config(format!(
            "window delta {delta} is too small to move a window ending at {end}"
        )));
    }
    Ok(((time - end) / delta).floor().max(0.0) + 1.0)
}

/// Accumulates `runs` in order against `schedule`, templating outputs from
/// the first run.
///
/// Each run is loaded, processed and dropped before the next is opened.
///
/// # Errors
/// Returns an error if no runs are given, a run cannot be loaded, or an
/// output cannot be written.
pub fn partition<S: ContainerStore>(
    store: &S,
    runs: &[PathBuf],
    schedule: WindowSchedule,
    options: &AccumulatorOptions,
) -> Result<PartitionReport> {
    let reference = runs
        .first()
        .ok_or_else(|| Error::config("at least one input run is required"))?;
    let mut accumulator = StreamAccumulator::new(store, reference, schedule, options)?;
    for path in runs {
        let run = RunFile::load(store, path)?;
        accumulator.process_run(&run)?;
        if accumulator.is_exhausted() {
            debug!("No windows left; remaining runs are not read");
            break;
        }
    }
    accumulator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_schedule_validation() {
        let window = Window::new("w", 100.0, 10.0).unwrap();
        assert!(WindowSchedule::periodic(window.clone(), 0.0, 0.0).is_err());
        assert!(WindowSchedule::periodic(window.clone(), 5.0, 12.0).is_err());
        assert!(WindowSchedule::periodic(window.clone(), -1.0, 12.0).is_err());

        match WindowSchedule::periodic(window, 2.0, 12.0).unwrap() {
            WindowSchedule::Periodic { window, delta } => {
                assert!((window.start() - 102.0).abs() < 1e-12);
                assert!((delta - 12.0).abs() < 1e-12);
            }
            WindowSchedule::Explicit(_) => panic!("expected a periodic schedule"),
        }
    }

    #[test]
    fn test_explicit_schedule_validation() {
        let a = Window::new("a", 0.0, 10.0).unwrap();
        let b = Window::new("b", 10.0, 10.0).unwrap();
        let c = Window::new("c", 15.0, 10.0).unwrap();
        assert!(WindowSchedule::explicit(vec![a.clone(), b.clone()]).is_ok());
        assert!(WindowSchedule::explicit(vec![a.clone(), c.clone()]).is_ok());
        assert!(WindowSchedule::explicit(vec![b.clone(), c]).is_err());
        assert!(WindowSchedule::explicit(vec![b, a]).is_err());
    }

    #[test]
    fn test_schedule_shift() {
        let mut schedule = WindowSchedule::periodic(Window::new("w", 0.0, 5.0).unwrap(), 1.0, 10.0).unwrap();
        schedule.shift(100.0);
        match schedule {
            WindowSchedule::Periodic { window, .. } => {
                assert!((window.start() - 101.0).abs() < 1e-12);
            }
            WindowSchedule::Explicit(_) => panic!("expected a periodic schedule"),
        }
    }

    #[test]
    fn test_periods_past() {
        assert!((periods_past(10.0, 10.0, 5.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((periods_past(10.0, 14.9, 5.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((periods_past(10.0, 15.0, 5.0).unwrap() - 2.0).abs() < 1e-12);
        assert!((periods_past(10.0, 1010.0, 5.0).unwrap() - 201.0).abs() < 1e-12);
        assert!(periods_past(1.6e9, 1.6e9 + 1.0, 1.0e-8).unwrap_err().is_config());
    }

    #[test]
    fn test_options_builder() {
        let options = AccumulatorOptions::new("/out")
            .with_slices(4)
            .with_policy(SlicePolicy::Summed)
            .with_post_processing(PostProcessingMode::ScaleDetectors);
        assert_eq!(options.slices, 4);
        assert_eq!(options.policy, SlicePolicy::Summed);
        assert_eq!(options.post_processing, PostProcessingMode::ScaleDetectors);
        assert_eq!(options.output_dir, PathBuf::from("/out"));
    }
}
