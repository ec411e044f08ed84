#![allow(clippy::cast_precision_loss)]
mod common;

use common::{add_run, add_run_with_events, ints, three_runs, BASE};
use modex_algorithms::{
    partition, AccumulatorOptions, OutputRecord, PartitionReport, SkipReason, SlicePolicy,
    WindowSchedule,
};
use modex_core::{PostProcessingMode, Window};
use modex_io::nexus;
use modex_io::{DatasetValue, MemoryStore};
use std::path::Path;

fn window(id: &str, start: f64, width: f64) -> Window {
    Window::new(id, BASE as f64 + start, width).unwrap()
}

#[test]
fn test_window_spanning_a_gap_carries_monitors() {
    let store = MemoryStore::new();
    let runs = three_runs(&store);
    let schedule = WindowSchedule::explicit(vec![window("on", 190.0, 20.0)]).unwrap();

    let report = partition(&store, &runs, schedule, &AccumulatorOptions::new("out")).unwrap();

    assert_eq!(report.outputs.len(), 1);
    assert!(report.skipped.is_empty());
    let output = &report.outputs[0].path;
    assert_eq!(output, &Path::new("out").join(format!("on-{}.nxs", BASE + 190)));

    // One frame from the second run and one from the third, each 1/10 of
    // its run's monitor counts.
    assert_eq!(ints(&store, output, nexus::GOOD_FRAMES), vec![2]);
    assert_eq!(ints(&store, output, &nexus::monitor_data_path(1)), vec![200, 2]);
    assert_eq!(ints(&store, output, nexus::DETECTOR_COUNTS), vec![2, 0, 0, 2]);
}

#[test]
fn test_splitting_conserves_frames_and_monitors() {
    let store = MemoryStore::new();
    let runs = three_runs(&store);
    let schedule = WindowSchedule::explicit(vec![window("on", 190.0, 20.0)]).unwrap();
    let options = AccumulatorOptions::new("out").with_slices(2);

    let report = partition(&store, &runs, schedule, &options).unwrap();

    assert_eq!(report.outputs.len(), 2);
    assert!(report.outputs[0].path.ends_with(format!("on-{}-001.nxs", BASE + 190)));
    assert!(report.outputs[1].path.ends_with(format!("on-{}-002.nxs", BASE + 190)));

    let mut frames = 0;
    let mut monitor = vec![0, 0];
    let mut counts = vec![0; 4];
    for record in &report.outputs {
        frames += ints(&store, &record.path, nexus::GOOD_FRAMES)[0];
        for (total, value) in monitor
            .iter_mut()
            .zip(ints(&store, &record.path, &nexus::monitor_data_path(1)))
        {
            *total += value;
        }
        for (total, value) in counts
            .iter_mut()
            .zip(ints(&store, &record.path, nexus::DETECTOR_COUNTS))
        {
            *total += value;
        }
    }
    assert_eq!(frames, 2);
    assert_eq!(monitor, vec![200, 2]);
    assert_eq!(counts, vec![2, 0, 0, 2]);
    assert_eq!(report.total_good_frames(), 2);

    // The frame at 190 s belongs to the first slice and the one at 205 s,
    // after the gap, to the second.
    for record in &report.outputs {
        assert_eq!(record.good_frames, 1);
        assert_eq!(ints(&store, &record.path, nexus::GOOD_FRAMES), vec![1]);
        assert_eq!(ints(&store, &record.path, nexus::DETECTOR_COUNTS), vec![1, 0, 0, 1]);
        assert_eq!(ints(&store, &record.path, &nexus::monitor_data_path(1)), vec![100, 1]);
    }
}

fn output_at(report: &PartitionReport, start: f64) -> &OutputRecord {
    report
        .outputs
        .iter()
        .find(|o| (o.window.start() - (BASE as f64 + start)).abs() < 1e-9)
        .unwrap_or_else(|| panic!("no output starts at {start}"))
}

#[test]
fn test_window_opened_after_gap_bins_into_current_slice() {
    let store = MemoryStore::new();
    let runs = vec![
        add_run(&store, "run1.nxs", 0, 100),
        add_run(&store, "run2.nxs", 135, 235),
    ];
    let schedule = WindowSchedule::periodic(window("pulse", 0.0, 20.0), 0.0, 20.0).unwrap();
    let options = AccumulatorOptions::new("out").with_slices(2);

    let report = partition(&store, &runs, schedule, &options).unwrap();

    // The window at 120 s opens on the frame at 135 s, inside its second slice.
    let first = output_at(&report, 120.0);
    let second = output_at(&report, 130.0);
    assert!(first.path.ends_with(format!("pulse-{}-001.nxs", BASE + 120)));
    assert_eq!(first.good_frames, 0);
    assert_eq!(ints(&store, &first.path, nexus::DETECTOR_COUNTS), vec![0; 4]);
    assert_eq!(ints(&store, &first.path, &nexus::monitor_data_path(1)), vec![0, 0]);
    assert_eq!(second.good_frames, 1);
    assert_eq!(ints(&store, &second.path, nexus::DETECTOR_COUNTS), vec![1, 0, 0, 1]);
    assert_eq!(ints(&store, &second.path, &nexus::monitor_data_path(1)), vec![100, 1]);

    // Every frame lands in exactly one slice.
    assert_eq!(report.outputs.len(), 22);
    assert_eq!(report.total_good_frames(), 20);
    assert!(report.outputs.iter().all(|o| o.good_frames <= 1));

    let skipped: Vec<f64> = report
        .skipped
        .iter()
        .map(|s| s.window.start() - BASE as f64)
        .collect();
    assert_eq!(skipped, vec![100.0]);
}

#[test]
fn test_periodic_start_long_before_data() {
    let store = MemoryStore::new();
    let run = add_run(&store, "run.nxs", 0, 100);
    let schedule =
        WindowSchedule::periodic(window("pulse", -1_000_000.0, 5.0), 10.0, 50.0).unwrap();

    let report = partition(&store, &[run], schedule, &AccumulatorOptions::new("out")).unwrap();

    let starts: Vec<f64> = report
        .outputs
        .iter()
        .map(|o| o.window.start() - BASE as f64)
        .collect();
    assert_eq!(starts, vec![10.0, 60.0, 110.0]);
    assert!(report.skipped.is_empty());
}

#[test]
fn test_unresolvable_delta_is_rejected() {
    let store = MemoryStore::new();
    let run = add_run(&store, "run.nxs", 0, 100);
    let schedule = WindowSchedule::periodic(window("pulse", -10.0, 1.0e-8), 0.0, 1.0e-8).unwrap();

    let err = partition(&store, &[run], schedule, &AccumulatorOptions::new("out")).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_every_valid_event_is_binned() {
    let store = MemoryStore::new();
    let frames = vec![
        vec![(1, 10.0), (0, 20.0)],
        vec![(2, 150.0), (1, 250.0)],
        vec![(3, 50.0), (1, 99.9)],
    ];
    let run = add_run_with_events(&store, "run.nxs", 0, 100, &frames);
    let schedule = WindowSchedule::explicit(vec![window("all", 0.0, 100.0)]).unwrap();

    let report = partition(&store, &[run], schedule, &AccumulatorOptions::new("out")).unwrap();

    let output = &report.outputs[0].path;
    // Id 0, unknown spectrum 3 and the TOF past the last edge are dropped.
    assert_eq!(ints(&store, output, nexus::DETECTOR_COUNTS), vec![2, 0, 0, 1]);
    assert_eq!(ints(&store, output, nexus::GOOD_FRAMES), vec![3]);
    assert_eq!(ints(&store, output, &nexus::monitor_data_path(1)), vec![1000, 10]);
}

#[test]
fn test_empty_output_keeps_template_metadata() {
    let store = MemoryStore::new();
    let runs = three_runs(&store);
    let schedule = WindowSchedule::explicit(vec![window("gap", 92.0, 6.0)]).unwrap();

    let report = partition(&store, &runs, schedule, &AccumulatorOptions::new("out")).unwrap();

    let output = &report.outputs[0].path;
    assert_eq!(
        store.dataset(output, nexus::TITLE),
        Some(DatasetValue::Text("beamline test".to_string()))
    );
    assert_eq!(
        store.dataset(output, nexus::START_TIME),
        store.dataset(&runs[0], nexus::START_TIME)
    );
    assert_eq!(ints(&store, output, nexus::GOOD_FRAMES), vec![0]);
    assert_eq!(ints(&store, output, nexus::DETECTOR_COUNTS), vec![0; 4]);
    assert_eq!(ints(&store, output, &nexus::monitor_data_path(1)), vec![0, 0]);

    let names = store.dataset_names(output);
    assert_eq!(names.len(), nexus::BASIC_TEMPLATE.len() + 1);
    assert!(!names.iter().any(|name| name == nexus::EVENT_ID));
}

#[test]
fn test_passed_windows_are_reported() {
    let store = MemoryStore::new();
    let runs = three_runs(&store);
    let schedule = WindowSchedule::explicit(vec![
        window("a", 1.0, 1.0),
        window("b", 3.0, 1.0),
        window("c", 190.0, 20.0),
        window("d", 400.0, 10.0),
        window("e", 420.0, 10.0),
    ])
    .unwrap();

    let report = partition(&store, &runs, schedule, &AccumulatorOptions::new("out")).unwrap();

    let written: Vec<&str> = report.outputs.iter().map(|o| o.window.id()).collect();
    // "d" opens after the last binned frame, so it is written empty.
    assert_eq!(written, vec!["a", "c", "d"]);
    let skipped: Vec<(&str, SkipReason)> = report
        .skipped
        .iter()
        .map(|s| (s.window.id(), s.reason))
        .collect();
    assert_eq!(
        skipped,
        vec![("b", SkipReason::NoFrames), ("e", SkipReason::NoFrames)]
    );
}

#[test]
fn test_summed_window_accumulates_every_period() {
    let store = MemoryStore::new();
    let run = add_run(&store, "run.nxs", 0, 100);
    let schedule = WindowSchedule::periodic(window("pulse", 0.0, 5.0), 0.0, 20.0).unwrap();
    let options = AccumulatorOptions::new("out").with_policy(SlicePolicy::Summed);

    let report = partition(&store, &[run], schedule, &options).unwrap();

    assert_eq!(report.outputs.len(), 1);
    let output = &report.outputs[0].path;
    assert!(output.ends_with(format!("pulse-{BASE}.nxs")));
    // Frames at 0, 20, 40, 60 and 80 s fall inside the repeated window.
    assert_eq!(ints(&store, output, nexus::GOOD_FRAMES), vec![5]);
    assert_eq!(ints(&store, output, nexus::DETECTOR_COUNTS), vec![5, 0, 0, 5]);
    assert_eq!(ints(&store, output, &nexus::monitor_data_path(1)), vec![500, 5]);
}

#[test]
fn test_summed_window_with_monitor_scaling() {
    let store = MemoryStore::new();
    let run = add_run(&store, "run.nxs", 0, 100);
    store.insert(&run, nexus::GOOD_FRAMES, DatasetValue::Int(vec![20]));
    let schedule = WindowSchedule::periodic(window("pulse", 0.0, 5.0), 0.0, 20.0).unwrap();
    let options = AccumulatorOptions::new("out")
        .with_policy(SlicePolicy::Summed)
        .with_post_processing(PostProcessingMode::ScaleMonitors);

    let report = partition(&store, &[run], schedule, &options).unwrap();

    // 5 detector frames against 10 monitor frames halves the monitors.
    let output = &report.outputs[0].path;
    assert_eq!(ints(&store, output, nexus::GOOD_FRAMES), vec![5]);
    assert_eq!(ints(&store, output, &nexus::monitor_data_path(1))[0], 250);
}

#[test]
fn test_individual_periodic_windows() {
    let store = MemoryStore::new();
    let run = add_run(&store, "run.nxs", 0, 100);
    let schedule = WindowSchedule::periodic(window("pulse", 0.0, 5.0), 10.0, 50.0).unwrap();

    let report = partition(&store, &[run], schedule, &AccumulatorOptions::new("out")).unwrap();

    // Windows at 10 and 60 s each take one frame. The one at 110 s is
    // already open when the data runs out.
    let starts: Vec<f64> = report
        .outputs
        .iter()
        .map(|o| o.window.start() - BASE as f64)
        .collect();
    assert_eq!(starts, vec![10.0, 60.0, 110.0]);
    let frames: Vec<i32> = report.outputs.iter().map(|o| o.good_frames).collect();
    assert_eq!(frames, vec![1, 1, 0]);
}

#[test]
fn test_summed_policy_rejects_explicit_windows() {
    let store = MemoryStore::new();
    let runs = three_runs(&store);
    let schedule = WindowSchedule::explicit(vec![window("on", 0.0, 5.0)]).unwrap();
    let options = AccumulatorOptions::new("out").with_policy(SlicePolicy::Summed);
    let err = partition(&store, &runs, schedule, &options).unwrap_err();
    assert!(err.is_config());
}
