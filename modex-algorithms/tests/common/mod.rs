#![allow(dead_code, clippy::cast_precision_loss)]
use modex_core::format_timestamp;
use modex_io::nexus;
use modex_io::{DatasetValue, MemoryStore};
use std::path::{Path, PathBuf};

/// 2020-01-14, far from any daylight saving change.
pub const BASE: i64 = 1_579_000_000;

pub const FRAMES_PER_RUN: usize = 10;
pub const FRAME_STEP: f64 = 10.0;
pub const MONITOR: [i32; 2] = [1000, 10];

/// Inserts a run spanning `[BASE + start, BASE + end)` with ten frames
/// every 10 s from its start. Each frame holds one event for spectrum 1 in
/// the first bin and one for spectrum 2 in the second.
pub fn add_run(store: &MemoryStore, name: &str, start: i64, end: i64) -> PathBuf {
    let events: Vec<Vec<(i32, f64)>> = (0..FRAMES_PER_RUN)
        .map(|_| vec![(1, 50.0), (2, 150.0)])
        .collect();
    add_run_with_events(store, name, start, end, &events)
}

/// Inserts a run with explicit `(spectrum, tof)` events per frame.
pub fn add_run_with_events(
    store: &MemoryStore,
    name: &str,
    start: i64,
    end: i64,
    frames: &[Vec<(i32, f64)>],
) -> PathBuf {
    let path = PathBuf::from(name);
    let text = |value: &str| DatasetValue::Text(value.to_string());
    let n_frames = i32::try_from(frames.len()).unwrap();

    store.insert(&path, nexus::TITLE, text("beamline test"));
    store.insert(&path, nexus::USER_NAME, text("experimenter"));
    store.insert(&path, nexus::START_TIME, text(&format_timestamp(BASE + start)));
    store.insert(&path, nexus::END_TIME, text(&format_timestamp(BASE + end)));
    store.insert(&path, nexus::GOOD_FRAMES, DatasetValue::Int(vec![n_frames]));
    store.insert(&path, nexus::RAW_FRAMES, DatasetValue::Int(vec![n_frames]));
    store.insert(&path, nexus::SPECTRUM_INDEX, DatasetValue::Int(vec![1, 2]));
    store.insert(&path, nexus::TIME_OF_FLIGHT, DatasetValue::Float(vec![0.0, 100.0, 200.0]));
    store.insert(&path, nexus::DETECTOR_COUNTS, DatasetValue::Int(vec![7; 4]));
    store.insert(&path, &nexus::monitor_data_path(1), DatasetValue::Int(MONITOR.to_vec()));

    let ids = frames.iter().flatten().map(|&(id, _)| id).collect();
    let offsets = frames.iter().flatten().map(|&(_, tof)| tof).collect();
    let zeros = (0..frames.len()).map(|f| f as f64 * FRAME_STEP).collect();
    let per_frame = frames
        .iter()
        .map(|events| i32::try_from(events.len()).unwrap())
        .collect();
    store.insert(&path, nexus::EVENT_ID, DatasetValue::Int(ids));
    store.insert(&path, nexus::EVENT_TIME_OFFSET, DatasetValue::Float(offsets));
    store.insert(&path, nexus::EVENT_TIME_ZERO, DatasetValue::Float(zeros));
    store.insert(&path, nexus::EVENTS_PER_FRAME, DatasetValue::Int(per_frame));
    path
}

/// Three runs: `[0, 100)`, `[100, 200)` and `[205, 300)` after a gap.
pub fn three_runs(store: &MemoryStore) -> Vec<PathBuf> {
    vec![
        add_run(store, "run1.nxs", 0, 100),
        add_run(store, "run2.nxs", 100, 200),
        add_run(store, "run3.nxs", 205, 300),
    ]
}

pub fn ints(store: &MemoryStore, container: &Path, dataset: &str) -> Vec<i32> {
    match store.dataset(container, dataset) {
        Some(DatasetValue::Int(values)) => values,
        other => panic!("{dataset} in {} is {other:?}", container.display()),
    }
}
