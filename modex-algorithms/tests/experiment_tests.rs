#![allow(clippy::cast_precision_loss)]
mod common;

use common::{ints, three_runs, BASE};
use modex_algorithms::{experiment_windows, run_experiment, RunTimeline, SkipReason};
use modex_core::ExperimentConfig;
use modex_io::nexus;
use modex_io::MemoryStore;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn config(output_dir: &Path, body: &str) -> ExperimentConfig {
    let json = format!(
        r#"{{
            "output_dir": "{}",
            "runs": ["run1.nxs", "run2.nxs", "run3.nxs"],
            {body}
        }}"#,
        output_dir.display()
    );
    ExperimentConfig::from_json(&json).unwrap()
}

const FORWARDS: &str = r#"
    "extrapolation": "forwards",
    "period": {
        "duration": 100.0,
        "pulses": [
            { "label": "on", "offset": 0.0, "duration": 50.0 },
            { "label": "off", "offset": 50.0, "duration": 50.0 }
        ]
    }"#;

#[test]
fn test_forwards_experiment_uses_every_frame() {
    let dir = tempdir().unwrap();
    let store = MemoryStore::new();
    three_runs(&store);
    let config = config(dir.path(), FORWARDS);

    let report = run_experiment(&store, &config).unwrap();

    assert_eq!(report.outputs.len(), 6);
    assert!(report.skipped.is_empty());
    assert_eq!(report.total_good_frames(), 30);
    let on = report.outputs.iter().filter(|o| o.window.id() == "on").count();
    assert_eq!(on, 3);

    let monitor: i32 = report
        .outputs
        .iter()
        .map(|o| ints(&store, &o.path, &nexus::monitor_data_path(1))[0])
        .sum();
    assert_eq!(monitor, 3000);
}

#[test]
fn test_experiment_writes_diagnostics() {
    let dir = tempdir().unwrap();
    let store = MemoryStore::new();
    three_runs(&store);
    let config = config(
        dir.path(),
        r#""extrapolation": "none",
        "pulses": [
            { "label": "on", "start": 190.0, "end": 210.0 },
            { "label": "on", "start": 400.0, "end": 410.0 }
        ]"#,
    );

    let report = run_experiment(&store, &config).unwrap();

    assert_eq!(report.outputs.len(), 1);
    assert_eq!(report.outputs[0].good_frames, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::Incomplete);
    assert!((report.skipped[0].window.start() - (BASE as f64 + 400.0)).abs() < 1e-9);

    let log = fs::read_to_string(&config.diagnostics).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(&format!("on-{}.nxs 2", BASE + 190)));
    assert!(lines[1].starts_with("# skipped on"));
}

#[test]
fn test_experiment_requires_existing_output_dir() {
    let dir = tempdir().unwrap();
    let store = MemoryStore::new();
    three_runs(&store);
    let config = config(&dir.path().join("missing"), FORWARDS);
    let err = run_experiment(&store, &config).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_explicit_windows_are_relative_to_first_run() {
    let store = MemoryStore::new();
    let runs = three_runs(&store);
    let timeline = RunTimeline::load(&store, &runs).unwrap();
    let config = config(
        Path::new("out"),
        r#""extrapolation": "none",
        "pulses": [
            { "label": "late", "start": 50.0, "end": 60.0 },
            { "label": "early", "start": 10.0, "end": 20.0 }
        ]"#,
    );

    let windows = experiment_windows(&config, &timeline).unwrap();
    let ids: Vec<&str> = windows.iter().map(|w| w.id()).collect();
    assert_eq!(ids, vec!["early", "late"]);
    assert!((windows[0].start() - (BASE as f64 + 10.0)).abs() < 1e-9);
    assert!((windows[1].duration() - 10.0).abs() < 1e-9);
}

#[test]
fn test_summed_experiment_writes_one_output() {
    let dir = tempdir().unwrap();
    let store = MemoryStore::new();
    three_runs(&store);
    let config = config(
        dir.path(),
        r#""extrapolation": "forwards_summed",
        "period": {
            "duration": 100.0,
            "begin": 10.0,
            "pulses": [{ "label": "pulse", "offset": 0.0, "duration": 20.0 }]
        }"#,
    );

    let report = run_experiment(&store, &config).unwrap();

    assert_eq!(report.outputs.len(), 1);
    // Frames at 10, 20, 110, 120, 215 and 225 s.
    assert_eq!(report.outputs[0].good_frames, 6);
    assert!(report.outputs[0]
        .path
        .ends_with(format!("pulse-{}.nxs", BASE + 10)));
}
