//! Run timeline and window-to-run binding.

use log::{debug, info};
use modex_core::Window;
use modex_io::{ContainerStore, Error, Result, RunSpan};
use std::path::{Path, PathBuf};

/// A window together with the runs holding its start and end.
///
/// Runs are identified by their position in the [`RunTimeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoundWindow {
    /// The window.
    pub window: Window,
    /// Run containing (or following) the window start.
    pub start_run: Option<usize>,
    /// Run containing (or preceding) the window end.
    pub end_run: Option<usize>,
}

impl BoundWindow {
    /// A window is complete when both endpoints are bound to a run.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.start_run.is_some() && self.end_run.is_some()
    }

    /// Indices of every run the window touches, in order.
    #[must_use]
    pub fn runs(&self) -> Option<std::ops::RangeInclusive<usize>> {
        match (self.start_run, self.end_run) {
            (Some(start), Some(end)) => Some(start..=end),
            _ => None,
        }
    }
}

/// Time-ordered spans of the input runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTimeline {
    spans: Vec<RunSpan>,
}

impl RunTimeline {
    /// Loads the span of every run, in the order given.
    ///
    /// # Errors
    /// Returns an error if a run cannot be read or the runs are not in
    /// start-time order.
    pub fn load<S: ContainerStore>(store: &S, runs: &[PathBuf]) -> Result<Self> {
        let spans = runs
            .iter()
            .map(|path| RunSpan::load(store, path))
            .collect::<Result<Vec<_>>>()?;
        let timeline = Self::from_spans(spans)?;
        if let (Some(first), Some(last)) = (timeline.spans.first(), timeline.spans.last()) {
            info!(
                "Loaded {} runs spanning {} to {} ({} s)",
                timeline.spans.len(),
                first.start_epoch,
                last.end_epoch,
                last.end_epoch - first.start_epoch
            );
        }
        Ok(timeline)
    }

    /// Builds a timeline from already loaded spans.
    ///
    /// # Errors
    /// Returns a configuration error if there are no spans or they are not
    /// in non-decreasing start-time order.
    pub fn from_spans(spans: Vec<RunSpan>) -> Result<Self> {
        if spans.is_empty() {
            return Err(Error::config("at least one input run is required"));
        }
        if let Some(pair) = spans.windows(2).find(|w| w[1].start_epoch < w[0].start_epoch) {
            return Err(Error::config(format!(
                "run {} starts before the preceding run {}",
                pair[1].path.display(),
                pair[0].path.display()
            )));
        }
        Ok(Self { spans })
    }

    /// Run spans, in order.
    #[must_use]
    pub fn spans(&self) -> &[RunSpan] {
        &self.spans
    }

    /// Path of run `index`.
    #[must_use]
    pub fn path(&self, index: usize) -> Option<&Path> {
        self.spans.get(index).map(|span| span.path.as_path())
    }

    /// Start of the first run, in epoch seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn experiment_start(&self) -> f64 {
        self.spans.first().map_or(0.0, |span| span.start_epoch as f64)
    }

    /// End of the last run, in epoch seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn experiment_end(&self) -> f64 {
        self.spans.last().map_or(0.0, |span| span.end_epoch as f64)
    }

    /// Run whose `[start, end)` contains `time`.
    #[must_use]
    pub fn run_containing(&self, time: f64) -> Option<usize> {
        self.spans.iter().position(|span| span.contains(time))
    }

    /// Run whose `(start, end]` contains `time`, the run in which a window
    /// ending at `time` ends.
    #[allow(clippy::cast_precision_loss)]
    fn run_ending(&self, time: f64) -> Option<usize> {
        self.spans
            .iter()
            .position(|span| time > span.start_epoch as f64 && time <= span.end_epoch as f64)
    }

    /// Index of the inter-run gap containing `time`: gap `g` lies between
    /// runs `g` and `g + 1`. Times before the first run or after the last
    /// are in no gap.
    #[allow(clippy::cast_precision_loss)]
    fn gap_containing(&self, time: f64) -> Option<usize> {
        self.spans.windows(2).position(|pair| {
            time >= pair[0].end_epoch as f64 && time <= pair[1].start_epoch as f64
        })
    }

    /// Binds a window to the runs holding its endpoints.
    ///
    /// An endpoint not inside any run falls back to the neighbouring run
    /// across the gap it lies in (the next run for the start, the previous
    /// run for the end), provided the other endpoint is inside a run.
    #[must_use]
    pub fn bind(&self, window: Window) -> BoundWindow {
        let direct_start = self.run_containing(window.start());
        let direct_end = self.run_ending(window.end());

        let start_run = match (direct_start, direct_end) {
            (Some(run), _) => Some(run),
            (None, Some(_)) => self.gap_containing(window.start()).map(|gap| gap + 1),
            (None, None) => None,
        };
        let end_run = match (direct_end, direct_start) {
            (Some(run), _) => Some(run),
            (None, Some(_)) => self.gap_containing(window.end()),
            (None, None) => None,
        };

        // A fallback may only widen the window onto a neighbouring run, never
        // invert it.
        let (start_run, end_run) = match (start_run, end_run) {
            (Some(start), Some(end)) if start > end => (None, None),
            other => other,
        };

        debug!("Window {window} bound to runs {start_run:?}..{end_run:?}");
        BoundWindow {
            window,
            start_run,
            end_run,
        }
    }

    /// Binds every window and separates complete from incomplete ones.
    #[must_use]
    pub fn bind_all(&self, windows: Vec<Window>) -> (Vec<BoundWindow>, Vec<BoundWindow>) {
        windows
            .into_iter()
            .map(|window| self.bind(window))
            .partition(BoundWindow::is_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(name: &str, start: i64, end: i64) -> RunSpan {
        RunSpan {
            path: PathBuf::from(name),
            start_epoch: start,
            end_epoch: end,
        }
    }

    fn three_runs() -> RunTimeline {
        RunTimeline::from_spans(vec![
            span("run1", 0, 100),
            span("run2", 100, 200),
            span("run3", 205, 300),
        ])
        .unwrap()
    }

    fn window(start: f64, end: f64) -> Window {
        Window::new("w", start, end - start).unwrap()
    }

    #[test]
    fn test_direct_binding() {
        let timeline = three_runs();
        let bound = timeline.bind(window(10.0, 50.0));
        assert_eq!(bound.start_run, Some(0));
        assert_eq!(bound.end_run, Some(0));

        let straddling = timeline.bind(window(90.0, 110.0));
        assert_eq!(straddling.runs(), Some(0..=1));
    }

    #[test]
    fn test_window_ending_at_run_end() {
        let timeline = three_runs();
        let bound = timeline.bind(window(250.0, 300.0));
        assert_eq!(bound.start_run, Some(2));
        assert_eq!(bound.end_run, Some(2));
    }

    #[test]
    fn test_window_across_gap() {
        let timeline = three_runs();
        let bound = timeline.bind(window(190.0, 210.0));
        assert_eq!(bound.start_run, Some(1));
        assert_eq!(bound.end_run, Some(2));
    }

    #[test]
    fn test_adjacent_fallback() {
        let timeline = three_runs();
        // Starts in the gap, ends in run 3.
        let start_in_gap = timeline.bind(window(202.0, 250.0));
        assert_eq!(start_in_gap.start_run, Some(2));
        assert_eq!(start_in_gap.end_run, Some(2));

        // Starts in run 2, ends in the gap.
        let end_in_gap = timeline.bind(window(150.0, 203.0));
        assert_eq!(end_in_gap.start_run, Some(1));
        assert_eq!(end_in_gap.end_run, Some(1));
    }

    #[test]
    fn test_incomplete_windows() {
        let timeline = three_runs();
        let in_gap = timeline.bind(window(201.0, 204.0));
        assert!(!in_gap.is_complete());

        let before = timeline.bind(window(-50.0, 10.0));
        assert!(!before.is_complete());

        let after = timeline.bind(window(290.0, 350.0));
        assert!(!after.is_complete());

        let (complete, incomplete) =
            timeline.bind_all(vec![window(10.0, 20.0), window(201.0, 204.0)]);
        assert_eq!(complete.len(), 1);
        assert_eq!(incomplete.len(), 1);
        assert!((incomplete[0].window.start() - 201.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unordered_runs_rejected() {
        let result = RunTimeline::from_spans(vec![span("b", 100, 200), span("a", 0, 100)]);
        assert!(result.is_err());
        assert!(RunTimeline::from_spans(Vec::new()).is_err());
    }
}
