//! modex-algorithms: Windowed re-accumulation of neutron event data.
//!
//! This crate provides:
//! - **Run binding** - locating the runs that hold each window, with
//!   adjacent-run fallback across gaps
//! - **Stream accumulation** - individual and summed slice policies with
//!   fractional monitor carry-over
//! - **Post-processing** - monitor/detector frame renormalisation
//! - **Experiment workflow** - pattern generation through diagnostics
//! - **Dumps** - per-detector event lists, histograms and monitors
//!
#![warn(missing_docs)]

mod accumulator;
pub mod dump;
mod experiment;
mod materialize;
mod postprocess;
mod report;
mod slices;
mod timeline;

pub use accumulator::{
    partition, AccumulatorOptions, SlicePolicy, StreamAccumulator, WindowSchedule,
};
pub use dump::{dump_detector, dump_events, dump_monitor, export_spectra};
pub use experiment::{experiment_windows, run_experiment};
pub use materialize::OutputMaterializer;
pub use postprocess::PostProcessor;
pub use report::{OutputRecord, PartitionReport, SkipReason, SkippedWindow};
pub use slices::{output_path, Slice, SliceSet, SliceSetFactory};
pub use timeline::{BoundWindow, RunTimeline};
