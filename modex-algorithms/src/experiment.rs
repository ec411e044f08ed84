//! Modulation-excitation experiment workflow.

use crate::accumulator::{AccumulatorOptions, SlicePolicy, StreamAccumulator, WindowSchedule};
use crate::report::{PartitionReport, SkipReason};
use crate::timeline::{BoundWindow, RunTimeline};
use log::{info, warn};
use modex_core::{generate_windows, ExperimentConfig, ExtrapolationMode, Window};
use modex_io::{ContainerStore, DiagnosticLog, Error, Result, RunFile};
use std::path::PathBuf;

/// Generates, binds and accumulates every window of an experiment.
///
/// Outputs go to the configured output directory and one line per output or
/// skipped window is written to the diagnostic log.
///
/// # Errors
/// Returns an error if the output directory does not exist, a run cannot be
/// read, or an output cannot be written.
pub fn run_experiment<S: ContainerStore>(store: &S, config: &ExperimentConfig) -> Result<PartitionReport> {
    if !config.output_dir.is_dir() {
        return Err(Error::config(format!(
            "output directory {} does not exist",
            config.output_dir.display()
        )));
    }

    let timeline = RunTimeline::load(store, &config.runs)?;
    let options = AccumulatorOptions::new(&config.output_dir)
        .with_slices(config.slices)
        .with_post_processing(config.post_processing);

    let report = if config.extrapolation == ExtrapolationMode::ForwardsSummed {
        run_summed(store, config, &timeline, options)?
    } else {
        let windows = experiment_windows(config, &timeline)?;
        info!("Generated {} windows", windows.len());
        run_individual(store, config, &timeline, windows, &options)?
    };

    let mut log = DiagnosticLog::create(&config.diagnostics)?;
    report.write_diagnostics(&mut log)?;
    info!(
        "Wrote {} outputs ({} good frames), skipped {} windows",
        report.outputs.len(),
        report.total_good_frames(),
        report.skipped.len()
    );
    Ok(report)
}

/// Concrete windows for the explicit and extrapolated modes.
///
/// # Errors
/// Returns a configuration error if an explicit pulse is invalid or the
/// periodic mode has no period.
pub fn experiment_windows(config: &ExperimentConfig, timeline: &RunTimeline) -> Result<Vec<Window>> {
    let exp_start = timeline.experiment_start();
    if config.extrapolation == ExtrapolationMode::None {
        let mut windows = config
            .pulses
            .iter()
            .map(|pulse| pulse.to_window(exp_start))
            .collect::<modex_core::Result<Vec<_>>>()?;
        windows.sort_by(|a, b| a.start().total_cmp(&b.start()));
        return Ok(windows);
    }

    let period = config
        .period
        .as_ref()
        .ok_or_else(|| Error::config("periodic extrapolation requires a period definition"))?;
    let extent = config.extrapolation.extent().unwrap_or_default();
    Ok(generate_windows(
        exp_start,
        timeline.experiment_end(),
        &period.definition,
        period.begin,
        extent,
    ))
}

fn run_individual<S: ContainerStore>(
    store: &S,
    config: &ExperimentConfig,
    timeline: &RunTimeline,
    windows: Vec<Window>,
    options: &AccumulatorOptions,
) -> Result<PartitionReport> {
    let mut report = PartitionReport::default();
    let (complete, incomplete) = timeline.bind_all(windows);
    for bound in incomplete {
        warn!("Skipping window {}: no run covers it", bound.window);
        report.skip(bound.window, SkipReason::Incomplete);
    }

    let reference = timeline
        .path(0)
        .ok_or_else(|| Error::config("at least one input run is required"))?
        .to_path_buf();

    for label in config.labels() {
        let bound: Vec<BoundWindow> = complete
            .iter()
            .filter(|b| b.window.id() == label)
            .cloned()
            .collect();
        if bound.is_empty() {
            continue;
        }

        let mut needed = vec![false; timeline.spans().len()];
        for runs in bound.iter().filter_map(BoundWindow::runs) {
            for index in runs {
                needed[index] = true;
            }
        }

        info!("Processing {} windows labelled '{label}'", bound.len());
        let schedule = WindowSchedule::explicit(bound.into_iter().map(|b| b.window).collect())?;
        let mut accumulator = StreamAccumulator::new(store, &reference, schedule, options)?;
        for (index, span) in timeline.spans().iter().enumerate() {
            if !needed[index] {
                continue;
            }
            let run = RunFile::load(store, &span.path)?;
            accumulator.process_run(&run)?;
            if accumulator.is_exhausted() {
                break;
            }
        }
        report.extend(accumulator.finish()?);
    }
    Ok(report)
}

fn run_summed<S: ContainerStore>(
    store: &S,
    config: &ExperimentConfig,
    timeline: &RunTimeline,
    options: AccumulatorOptions,
) -> Result<PartitionReport> {
    let period = config
        .period
        .as_ref()
        .ok_or_else(|| Error::config("forwards_summed requires a period definition"))?;
    let pulse = period
        .definition
        .pulses()
        .first()
        .ok_or_else(|| Error::config("forwards_summed requires one pulse definition"))?;

    let window = Window::new(
        pulse.label.clone(),
        timeline.experiment_start() + period.begin + pulse.period_offset,
        pulse.duration,
    )?
    .with_source(pulse.clone());
    info!(
        "Summing window {window} repeated every {} s",
        period.definition.duration()
    );
    let schedule = WindowSchedule::periodic(window, 0.0, period.definition.duration())?;
    let runs: Vec<PathBuf> = timeline.spans().iter().map(|s| s.path.clone()).collect();
    crate::accumulator::partition(
        store,
        &runs,
        schedule,
        &options.with_policy(SlicePolicy::Summed),
    )
}
