//! Experiment configuration.
//!
//! An experiment is described by a JSON document:
//!
//! ```json
//! {
//!   "output_dir": "out",
//!   "runs": ["NIMROD00001.nxs", "NIMROD00002.nxs"],
//!   "extrapolation": "forwards",
//!   "period": {
//!     "duration": 600.0,
//!     "begin": 30.0,
//!     "pulses": [
//!       { "label": "on", "offset": 0.0, "duration": 300.0 },
//!       { "label": "off", "offset": 300.0, "duration": 300.0 }
//!     ]
//!   },
//!   "slices": 1,
//!   "post_processing": "scale_monitors"
//! }
//! ```
//!
//! With `"extrapolation": "none"` the `period` block is replaced by a list of
//! explicit `pulses`, each `{ "label", "start", "end" }` in seconds relative
//! to the start of the first run.

use crate::period::{Extent, PeriodDefinition, PulseDefinition};
use crate::window::Window;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Default diagnostic log name inside the output directory.
pub const DEFAULT_DIAGNOSTICS_NAME: &str = "modex.diagnostics";

/// How pulse definitions are repeated across the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrapolationMode {
    /// Repeat from the anchor towards the end of the experiment.
    Forwards,
    /// Repeat from the anchor towards the start of the experiment.
    Backwards,
    /// Repeat in both directions.
    BiDirectional,
    /// Repeat forwards, summing every repetition into one output.
    ForwardsSummed,
    /// Use explicit pulses only.
    None,
}

impl ExtrapolationMode {
    /// Generator extent for the periodic modes, `None` otherwise.
    #[must_use]
    pub fn extent(self) -> Option<Extent> {
        match self {
            Self::Forwards => Some(Extent {
                backwards: false,
                forwards: true,
            }),
            Self::Backwards => Some(Extent {
                backwards: true,
                forwards: false,
            }),
            Self::BiDirectional => Some(Extent {
                backwards: true,
                forwards: true,
            }),
            Self::ForwardsSummed | Self::None => None,
        }
    }
}

/// Renormalisation applied to each slice after accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessingMode {
    /// Leave counts untouched.
    #[default]
    None,
    /// Scale monitors by detector frames / monitor frames.
    ScaleMonitors,
    /// Scale detector counts by monitor frames / detector frames.
    ScaleDetectors,
}

/// A periodic pattern anchored `begin` seconds after the experiment start.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodPattern {
    pub definition: PeriodDefinition,
    pub begin: f64,
}

/// An explicit pulse, relative to the experiment start.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitPulse {
    pub label: String,
    pub start: f64,
    pub end: f64,
}

impl ExplicitPulse {
    /// Converts the pulse to an absolute window starting at `origin + start`.
    ///
    /// # Errors
    /// Returns an error if the resulting window is invalid.
    pub fn to_window(&self, origin: f64) -> Result<Window> {
        Window::new(self.label.clone(), origin + self.start, self.end - self.start)
    }
}

/// Validated experiment configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    /// Directory receiving output containers.
    pub output_dir: PathBuf,
    /// Input runs, in acquisition order.
    pub runs: Vec<PathBuf>,
    pub extrapolation: ExtrapolationMode,
    /// Periodic pattern; present for every mode except `None`.
    pub period: Option<PeriodPattern>,
    /// Explicit pulses; used only when extrapolation is `None`.
    pub pulses: Vec<ExplicitPulse>,
    /// Number of slices per window.
    pub slices: usize,
    pub post_processing: PostProcessingMode,
    /// Diagnostic log path.
    pub diagnostics: PathBuf,
}

// Intermediate structs for the JSON schema
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonConfig {
    output_dir: PathBuf,
    runs: Vec<PathBuf>,
    extrapolation: ExtrapolationMode,
    #[serde(default)]
    period: Option<JsonPeriod>,
    #[serde(default)]
    pulses: Vec<JsonPulse>,
    #[serde(default = "default_slices")]
    slices: usize,
    #[serde(default)]
    post_processing: PostProcessingMode,
    #[serde(default)]
    diagnostics: Option<PathBuf>,
}

fn default_slices() -> usize {
    1
}

#[derive(Deserialize)]
struct JsonPeriod {
    duration: f64,
    #[serde(default)]
    begin: f64,
    pulses: Vec<JsonPeriodPulse>,
}

#[derive(Deserialize)]
struct JsonPeriodPulse {
    label: String,
    offset: f64,
    duration: f64,
}

#[derive(Deserialize)]
struct JsonPulse {
    label: String,
    start: f64,
    end: f64,
}

impl ExperimentConfig {
    /// Loads a configuration file.
    ///
    /// Relative run, output and diagnostics paths are resolved against the
    /// directory containing the configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_json_config(json_config, base)
    }

    /// Loads a configuration from a JSON string. Paths are kept as given.
    ///
    /// # Errors
    /// Returns an error if the JSON is invalid or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config, Path::new(""))
    }

    fn from_json_config(config: JsonConfig, base: &Path) -> Result<Self> {
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };

        if config.runs.is_empty() {
            return Err(Error::config("no runs given"));
        }
        if config.slices == 0 {
            return Err(Error::config("slice count must be at least 1"));
        }

        let period = match (config.extrapolation, config.period) {
            (ExtrapolationMode::None, _) => None,
            (_, None) => {
                return Err(Error::config(format!(
                    "extrapolation mode {:?} requires a period definition",
                    config.extrapolation
                )))
            }
            (mode, Some(period)) => {
                if mode == ExtrapolationMode::ForwardsSummed && period.pulses.len() != 1 {
                    return Err(Error::config(format!(
                        "forwards_summed requires exactly one pulse definition, got {}",
                        period.pulses.len()
                    )));
                }
                let pulses = period
                    .pulses
                    .into_iter()
                    .map(|p| PulseDefinition::new(p.label, p.offset, p.duration))
                    .collect();
                Some(PeriodPattern {
                    definition: PeriodDefinition::new(period.duration, pulses)?,
                    begin: period.begin,
                })
            }
        };

        let pulses: Vec<ExplicitPulse> = if config.extrapolation == ExtrapolationMode::None {
            if config.pulses.is_empty() {
                return Err(Error::config(
                    "extrapolation mode none requires explicit pulses",
                ));
            }
            config
                .pulses
                .into_iter()
                .map(|p| {
                    if p.end < p.start {
                        Err(Error::config(format!(
                            "pulse '{}' ends ({}) before it starts ({})",
                            p.label, p.end, p.start
                        )))
                    } else {
                        Ok(ExplicitPulse {
                            label: p.label,
                            start: p.start,
                            end: p.end,
                        })
                    }
                })
                .collect::<Result<_>>()?
        } else {
            Vec::new()
        };

        let output_dir = resolve(config.output_dir);
        let diagnostics = config.diagnostics.map_or_else(
            || output_dir.join(DEFAULT_DIAGNOSTICS_NAME),
            resolve,
        );

        Ok(Self {
            runs: config.runs.into_iter().map(resolve).collect(),
            output_dir,
            extrapolation: config.extrapolation,
            period,
            pulses,
            slices: config.slices,
            post_processing: config.post_processing,
            diagnostics,
        })
    }

    /// Distinct pulse labels, in first-seen order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        let names: Vec<&str> = match &self.period {
            Some(period) => period
                .definition
                .pulses()
                .iter()
                .map(|p| p.label.as_str())
                .collect(),
            None => self.pulses.iter().map(|p| p.label.as_str()).collect(),
        };
        for name in names {
            if !labels.iter().any(|l| l == name) {
                labels.push(name.to_string());
            }
        }
        labels
    }
}
