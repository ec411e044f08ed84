//! Time-of-flight histograms.
//!
//! [`HistogramBank`] stores one histogram per spectrum, all sharing the same
//! bin edges, in a single flattened array.

use crate::{Error, Result};
use std::collections::HashMap;

/// Returns the bin containing `value`, or `None` if it lies outside the edges.
///
/// Bins are half-open `[edges[i], edges[i + 1])`.
#[must_use]
pub fn bin_index(edges: &[f64], value: f64) -> Option<usize> {
    let upper = edges.partition_point(|&edge| edge <= value);
    if upper == 0 || upper >= edges.len() {
        None
    } else {
        Some(upper - 1)
    }
}

fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::config(format!(
            "histogram needs at least two bin edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|edge| !edge.is_finite()) || edges.windows(2).any(|w| w[0] > w[1]) {
        return Err(Error::config("histogram bin edges must be finite and ascending"));
    }
    Ok(())
}

/// Per-spectrum histograms sharing one set of TOF bin edges.
///
/// Counts are stored spectrum-major: `counts[row * n_bins + bin]`, where
/// `row` is the position of the spectrum in the spectrum list. This matches
/// the flattened layout of the detector counts dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBank {
    spectra: Vec<i32>,
    edges: Vec<f64>,
    counts: Vec<u64>,
    rows: HashMap<i32, usize>,
}

impl HistogramBank {
    /// Creates a zeroed bank for the given spectrum list.
    ///
    /// # Errors
    /// Returns an error if the edges are invalid or a spectrum id repeats.
    pub fn new(spectra: Vec<i32>, edges: Vec<f64>) -> Result<Self> {
        validate_edges(&edges)?;
        let mut rows = HashMap::with_capacity(spectra.len());
        for (row, &spectrum) in spectra.iter().enumerate() {
            if rows.insert(spectrum, row).is_some() {
                return Err(Error::config(format!(
                    "spectrum {spectrum} appears more than once"
                )));
            }
        }
        let counts = vec![0; spectra.len() * (edges.len() - 1)];
        Ok(Self {
            spectra,
            edges,
            counts,
            rows,
        })
    }

    /// Number of TOF bins per spectrum.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Spectrum ids, in row order.
    #[must_use]
    pub fn spectra(&self) -> &[i32] {
        &self.spectra
    }

    /// TOF bin edges shared by every spectrum.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Flattened counts, spectrum-major.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Counts for one spectrum, if it is part of the bank.
    #[must_use]
    pub fn spectrum(&self, spectrum: i32) -> Option<&[u64]> {
        let n_bins = self.n_bins();
        self.rows
            .get(&spectrum)
            .map(|&row| &self.counts[row * n_bins..(row + 1) * n_bins])
    }

    /// Records one event. Unknown spectra and out-of-range times are dropped.
    ///
    /// Returns true if a bin was incremented.
    pub fn fill(&mut self, spectrum: i32, tof: f64) -> bool {
        let Some(&row) = self.rows.get(&spectrum) else {
            return false;
        };
        match bin_index(&self.edges, tof) {
            Some(bin) => {
                let n_bins = self.n_bins();
                self.counts[row * n_bins + bin] += 1;
                true
            }
            None => false,
        }
    }

    /// Total counts over every spectrum.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Multiplies every bin by `factor`, rounding to the nearest count.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn scale(&mut self, factor: f64) {
        for count in &mut self.counts {
            *count = (*count as f64 * factor).round().max(0.0) as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_index_half_open() {
        let edges = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(bin_index(&edges, -0.1), None);
        assert_eq!(bin_index(&edges, 0.0), Some(0));
        assert_eq!(bin_index(&edges, 9.99), Some(0));
        assert_eq!(bin_index(&edges, 10.0), Some(1));
        assert_eq!(bin_index(&edges, 29.99), Some(2));
        assert_eq!(bin_index(&edges, 30.0), None);
    }

    #[test]
    fn test_invalid_edges() {
        assert!(HistogramBank::new(vec![1], vec![1.0]).is_err());
        assert!(HistogramBank::new(vec![1], vec![2.0, 1.0]).is_err());
        assert!(HistogramBank::new(vec![1, 1], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_bank_layout() {
        let mut bank = HistogramBank::new(vec![5, 7, 9], vec![0.0, 100.0, 200.0]).unwrap();
        assert!(bank.fill(7, 150.0));
        assert!(bank.fill(9, 0.0));
        assert!(bank.fill(9, 50.0));
        assert!(!bank.fill(8, 50.0), "unknown spectrum must be dropped");
        assert!(!bank.fill(5, 250.0), "out of range time must be dropped");

        assert_eq!(bank.counts(), &[0, 0, 0, 1, 2, 0]);
        assert_eq!(bank.spectrum(9), Some(&[2, 0][..]));
        assert_eq!(bank.spectrum(8), None);
        assert_eq!(bank.total(), 3);
    }

    #[test]
    fn test_bank_scale_rounds() {
        let mut bank = HistogramBank::new(vec![1], vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        for _ in 0..5 {
            bank.fill(1, 0.5);
        }
        for _ in 0..3 {
            bank.fill(1, 1.5);
        }
        bank.scale(0.5);
        assert_eq!(bank.counts(), &[3, 2, 0]);
        assert_eq!(bank.total(), 5);
    }
}
