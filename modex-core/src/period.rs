//! Periodic pulse patterns and the window generator.

use crate::window::Window;
use crate::{Error, Result};
use std::collections::HashSet;

/// A pulse positioned at a fixed offset within a repeating period.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseDefinition {
    /// Label, used as the id of every generated window.
    pub label: String,
    /// Seconds from the start of the period to the start of the pulse.
    pub period_offset: f64,
    /// Pulse duration in seconds.
    pub duration: f64,
}

impl PulseDefinition {
    /// Creates a pulse definition.
    pub fn new(label: impl Into<String>, period_offset: f64, duration: f64) -> Self {
        Self {
            label: label.into(),
            period_offset,
            duration,
        }
    }

    fn validate(&self, period_duration: f64) -> Result<()> {
        let reject = |reason: String| -> Result<()> {
            Err(Error::InvalidPulseDefinition {
                label: self.label.clone(),
                reason,
            })
        };
        if !self.period_offset.is_finite() || self.period_offset < 0.0 {
            return reject(format!("offset {} is negative", self.period_offset));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return reject(format!("duration {} is negative", self.duration));
        }
        if self.period_offset > period_duration {
            return reject(format!(
                "offset {} exceeds period duration {period_duration}",
                self.period_offset
            ));
        }
        if self.period_offset + self.duration > period_duration {
            return reject(format!(
                "offset + duration {} exceeds period duration {period_duration}",
                self.period_offset + self.duration
            ));
        }
        Ok(())
    }
}

/// A repeating period containing one or more pulse definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodDefinition {
    duration: f64,
    pulses: Vec<PulseDefinition>,
}

impl PeriodDefinition {
    /// Creates a validated period definition.
    ///
    /// # Errors
    /// Returns an error if the period duration is not positive, if any pulse
    /// lies outside `[0, duration]`, or if two pulses share a label.
    pub fn new(duration: f64, pulses: Vec<PulseDefinition>) -> Result<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(Error::config(format!(
                "period duration must be positive, got {duration}"
            )));
        }
        if pulses.is_empty() {
            return Err(Error::config("period has no pulse definitions"));
        }
        let mut labels = HashSet::new();
        for pulse in &pulses {
            pulse.validate(duration)?;
            if !labels.insert(pulse.label.as_str()) {
                return Err(Error::InvalidPulseDefinition {
                    label: pulse.label.clone(),
                    reason: "label is defined more than once".to_string(),
                });
            }
        }
        Ok(Self { duration, pulses })
    }

    /// Period duration in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Pulse definitions in declaration order.
    #[must_use]
    pub fn pulses(&self) -> &[PulseDefinition] {
        &self.pulses
    }
}

/// How far the periodic pattern is extended from its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    /// Repeat the pattern towards the experiment start.
    pub backwards: bool,
    /// Repeat the pattern towards the experiment end.
    pub forwards: bool,
}

/// Generates concrete windows for a periodic pattern.
///
/// The first period starts `period_begin` seconds after `exp_start`. Every
/// repetition yields one window per pulse definition, unless the pulse would
/// start at or after `exp_end`. The result is sorted by start time with ties
/// kept in definition order.
#[must_use]
pub fn generate_windows(
    exp_start: f64,
    exp_end: f64,
    period: &PeriodDefinition,
    period_begin: f64,
    extent: Extent,
) -> Vec<Window> {
    let first = exp_start + period_begin;
    let mut anchors = vec![first];

    if extent.backwards {
        let mut k = 1u32;
        loop {
            let anchor = first - period.duration * f64::from(k);
            if anchor <= exp_start {
                break;
            }
            anchors.push(anchor);
            k += 1;
        }
    }
    if extent.forwards {
        let mut k = 1u32;
        loop {
            let anchor = first + period.duration * f64::from(k);
            if anchor >= exp_end {
                break;
            }
            anchors.push(anchor);
            k += 1;
        }
    }

    let mut generated: Vec<(usize, Window)> = Vec::new();
    for anchor in anchors {
        for (index, pulse) in period.pulses.iter().enumerate() {
            let start = anchor + pulse.period_offset;
            if start >= exp_end {
                continue;
            }
            // Definitions were validated, so construction only fails on
            // non-finite bounds passed by the caller.
            if let Ok(window) = Window::new(pulse.label.clone(), start, pulse.duration) {
                generated.push((index, window.with_source(pulse.clone())));
            }
        }
    }

    generated.sort_by(|(ia, a), (ib, b)| a.start().total_cmp(&b.start()).then(ia.cmp(ib)));
    generated.into_iter().map(|(_, window)| window).collect()
}
