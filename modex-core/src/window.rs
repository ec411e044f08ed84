//! Time windows (pulses) over the experiment timeline.

use crate::period::PulseDefinition;
use crate::{Error, Result};
use std::fmt;

/// A concrete time interval of interest, in seconds since the Unix epoch.
///
/// Windows are immutable apart from [`Window::shift`], which the summed
/// accumulation mode uses to re-use a set of slices for the next repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    id: String,
    start: f64,
    duration: f64,
    source: Option<PulseDefinition>,
}

impl Window {
    /// Creates a window.
    ///
    /// # Errors
    /// Returns a configuration error if `start` is not finite or `duration`
    /// is negative or not finite.
    pub fn new(id: impl Into<String>, start: f64, duration: f64) -> Result<Self> {
        let id = id.into();
        if !start.is_finite() {
            return Err(Error::config(format!(
                "window '{id}' has a non-finite start time"
            )));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::config(format!(
                "window '{id}' has invalid duration {duration}"
            )));
        }
        Ok(Self {
            id,
            start,
            duration,
            source: None,
        })
    }

    /// Attaches the pulse definition this window was generated from.
    #[must_use]
    pub fn with_source(mut self, source: PulseDefinition) -> Self {
        self.source = Some(source);
        self
    }

    /// String identifier, used as the output file prefix.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start time (seconds since epoch).
    #[must_use]
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Duration in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// End time (seconds since epoch).
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Pulse definition the window was generated from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&PulseDefinition> {
        self.source.as_ref()
    }

    /// Shifts the start time by `delta` seconds.
    pub fn shift(&mut self, delta: f64) {
        self.start += delta;
    }

    /// Returns true if `time` lies in `[start, end)`.
    #[must_use]
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end()
    }

    /// Returns true if the two windows share any instant.
    #[must_use]
    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// Splits the window into `n` consecutive, equal-duration slices.
    ///
    /// Slice ids are the window id followed by the 1-based slice number.
    ///
    /// # Errors
    /// Returns a configuration error if `n` is zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn split(&self, n: usize) -> Result<Vec<Window>> {
        if n == 0 {
            return Err(Error::config("slice count must be at least 1"));
        }
        let slice_duration = self.duration / n as f64;
        (0..n)
            .map(|i| {
                let start = self.start + slice_duration * i as f64;
                let mut slice = Window::new(format!("{}{}", self.id, i + 1), start, slice_duration)?;
                slice.source.clone_from(&self.source);
                Ok(slice)
            })
            .collect()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' [{:.2}, {:.2})", self.id, self.start, self.end())
    }
}
