//! modex-core: Core value types for windowed event re-accumulation.
//!
//! This crate provides time windows, periodic pulse patterns and the window
//! generator, time-of-flight histograms, timestamp parsing and the
//! experiment configuration.
//!

pub mod config;
pub mod error;
pub mod histogram;
pub mod period;
pub mod time;
pub mod window;

pub use config::{ExperimentConfig, ExplicitPulse, ExtrapolationMode, PeriodPattern, PostProcessingMode};
pub use error::{Error, Result};
pub use histogram::{bin_index, HistogramBank};
pub use period::{generate_windows, Extent, PeriodDefinition, PulseDefinition};
pub use time::{format_timestamp, parse_timestamp};
pub use window::Window;
