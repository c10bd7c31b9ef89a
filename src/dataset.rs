//! Sample collections with per-sample scratch fields and run statistics.

use crate::error::{CartographerError, Result};
use crate::linalg::Vector;
use crate::som::Grid;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Scratch fields recomputed for every sample on each evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Offset of the winning neuron.
    pub winner: usize,
    /// Distance to the winning neuron.
    pub error: f64,
    /// Density of the winning neuron (PRSOM only).
    pub density: f64,
}

/// Aggregate quality of the latest evaluation pass.
///
/// `best_rms` and `best_contrast` are low-water marks: they never increase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Root mean square winner distance.
    pub rms: f64,
    /// Lowest `rms` seen so far.
    pub best_rms: f64,
    /// Occupancy non-uniformity (0 = every neuron wins equally often).
    pub contrast: f64,
    /// Lowest `contrast` seen so far.
    pub best_contrast: f64,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            rms: f64::INFINITY,
            best_rms: f64::INFINITY,
            contrast: f64::INFINITY,
            best_contrast: f64::INFINITY,
        }
    }
}

impl RunStats {
    /// Records a new pass and lowers the best values when improved.
    pub fn record(&mut self, rms: f64, contrast: f64) {
        self.rms = rms;
        self.contrast = contrast;
        self.best_rms = self.best_rms.min(rms);
        self.best_contrast = self.best_contrast.min(contrast);
    }
}

/// An ordered, fixed-size set of sample vectors.
#[derive(Debug, Clone)]
pub struct Dataset {
    dim: usize,
    samples: Vec<Vector>,
    info: Vec<SampleInfo>,
    /// Known class per sample, 0 = unknown.
    labels: Vec<u32>,
    stats: RunStats,
}

impl Dataset {
    /// Creates a dataset, checking that every sample has dimension `dim`.
    pub fn new(dim: usize, samples: Vec<Vector>) -> Result<Self> {
        if samples.is_empty() {
            return Err(CartographerError::EmptyInput("dataset has no samples".to_string()));
        }
        if dim == 0 {
            return Err(CartographerError::Config("feature dimension is zero".to_string()));
        }
        for sample in &samples {
            CartographerError::check_dim(dim, sample.dim())?;
        }

        let n = samples.len();
        Ok(Self {
            dim,
            samples,
            info: vec![SampleInfo::default(); n],
            labels: vec![0; n],
            stats: RunStats::default(),
        })
    }

    /// Creates a dataset from raw rows; the first row fixes the dimension.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        Self::new(dim, rows.into_iter().map(Vector::from_vec).collect())
    }

    /// Attaches known labels (0 = unknown), one per sample.
    pub fn with_labels(mut self, labels: Vec<u32>) -> Result<Self> {
        self.set_labels(labels)?;
        Ok(self)
    }

    /// Replaces the known labels.
    pub fn set_labels(&mut self, labels: Vec<u32>) -> Result<()> {
        CartographerError::check_dim(self.samples.len(), labels.len())?;
        self.labels = labels;
        Ok(())
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: an empty dataset cannot be constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Feature dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// One sample.
    #[inline]
    pub fn sample(&self, i: usize) -> &Vector {
        &self.samples[i]
    }

    /// All samples in order.
    #[inline]
    pub fn samples(&self) -> &[Vector] {
        &self.samples
    }

    /// Per-sample scratch fields.
    #[inline]
    pub fn info(&self) -> &[SampleInfo] {
        &self.info
    }

    /// Per-sample scratch fields, mutably.
    #[inline]
    pub fn info_mut(&mut self) -> &mut [SampleInfo] {
        &mut self.info
    }

    /// Samples alongside their mutable scratch fields.
    #[inline]
    pub fn samples_and_info_mut(&mut self) -> (&[Vector], &mut [SampleInfo]) {
        (&self.samples, &mut self.info)
    }

    /// Known labels, 0 = unknown.
    #[inline]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// True when at least one sample carries a known label.
    pub fn has_labels(&self) -> bool {
        self.labels.iter().any(|&l| l != 0)
    }

    /// Winner offsets from the latest evaluation pass.
    pub fn winners(&self) -> Vec<usize> {
        self.info.iter().map(|i| i.winner).collect()
    }

    /// Statistics of the latest evaluation pass.
    #[inline]
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Statistics, mutably.
    #[inline]
    pub fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }

    /// Recomputes every sample's winner on `grid`, then records RMS and
    /// contrast. Returns the new `(rms, contrast)`.
    ///
    /// The winner search is read-only and runs in parallel.
    pub fn evaluate(&mut self, grid: &Grid) -> Result<(f64, f64)> {
        CartographerError::check_dim(grid.dim(), self.dim)?;

        let winners: Vec<(usize, f64)> = self
            .samples
            .par_iter()
            .map(|x| grid.winner_unchecked(x))
            .collect();

        let mut counts = vec![0usize; grid.range()];
        for (info, &(winner, error)) in self.info.iter_mut().zip(&winners) {
            info.winner = winner;
            info.error = error;
            counts[winner] += 1;
        }

        let rms = rms(winners.iter().map(|&(_, e)| e));
        let contrast = contrast(&counts);
        self.stats.record(rms, contrast);
        Ok((rms, contrast))
    }

    /// Number of samples won by each of `range` cells.
    pub fn occupancy(&self, range: usize) -> Vec<usize> {
        let mut counts = vec![0usize; range];
        for info in &self.info {
            if info.winner < range {
                counts[info.winner] += 1;
            }
        }
        counts
    }
}

/// `sqrt(mean(e^2))`, 0 for an empty sequence.
pub fn rms(errors: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = errors.fold((0.0, 0usize), |(s, n), e| (s + e * e, n + 1));
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).sqrt()
    }
}

/// `sqrt(mean_c((count_c / (N / range) - 1)^2))` over all cells.
///
/// 0 when occupancy is perfectly uniform; also 0 when there are no samples.
pub fn contrast(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if counts.is_empty() || total == 0 {
        return 0.0;
    }
    let expected = total as f64 / counts.len() as f64;
    let sum: f64 = counts
        .iter()
        .map(|&c| {
            let r = c as f64 / expected - 1.0;
            r * r
        })
        .sum();
    (sum / counts.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_creation() {
        let data = Dataset::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.dim(), 2);
        assert!(!data.has_labels());
        assert_eq!(data.stats().best_rms, f64::INFINITY);
    }

    #[test]
    fn test_rejects_empty_and_ragged() {
        assert!(matches!(
            Dataset::from_rows(vec![]),
            Err(CartographerError::EmptyInput(_))
        ));
        assert!(matches!(
            Dataset::from_rows(vec![vec![1.0, 2.0], vec![3.0]]),
            Err(CartographerError::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_labels_length_checked() {
        let data = Dataset::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        assert!(data.clone().with_labels(vec![1]).is_err());
        let data = data.with_labels(vec![0, 3]).unwrap();
        assert!(data.has_labels());
    }

    #[test]
    fn test_contrast_uniform_is_zero() {
        assert_eq!(contrast(&[3, 3, 3]), 0.0);
        assert!(contrast(&[6, 0]) > 0.0);
        assert!((contrast(&[6, 0]) - 1.0).abs() < 1e-12);
        assert_eq!(contrast(&[0, 0]), 0.0);
    }

    #[test]
    fn test_rms() {
        assert!((rms([3.0, 4.0].into_iter()) - (12.5f64).sqrt()).abs() < 1e-12);
        assert_eq!(rms(std::iter::empty()), 0.0);
    }

    #[test]
    fn test_best_values_only_decrease() {
        let mut stats = RunStats::default();
        stats.record(2.0, 1.0);
        stats.record(3.0, 0.5);
        assert_eq!(stats.rms, 3.0);
        assert_eq!(stats.best_rms, 2.0);
        assert_eq!(stats.best_contrast, 0.5);
    }

    #[test]
    fn test_evaluate_assigns_winners() {
        let grid = Grid::new_linear(&[2], &[0.0], &[10.0], 1).unwrap();
        let mut data = Dataset::from_rows(vec![vec![1.0], vec![9.0], vec![8.0]]).unwrap();
        let (rms, contrast) = data.evaluate(&grid).unwrap();
        assert_eq!(data.winners(), vec![0, 1, 1]);
        assert!((rms - ((1.0 + 1.0 + 4.0) / 3.0f64).sqrt()).abs() < 1e-12);
        assert!(contrast > 0.0);
        assert_eq!(data.occupancy(2), vec![1, 2]);
    }
}
