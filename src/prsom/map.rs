//! Probabilistic map: a SOM grid whose neurons also own a variance.

use crate::error::{CartographerError, Result};
use crate::som::Grid;
use serde::{Deserialize, Serialize};

/// `ln(sqrt(2 * pi))`.
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// A grid plus one isotropic Gaussian variance per neuron.
///
/// `cardinality[c]` is the number of samples the neuron won on the latest
/// assignment pass; it acts as the neuron's prior weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticMap {
    grid: Grid,
    sigma: Vec<f64>,
    cardinality: Vec<usize>,
}

impl ProbabilisticMap {
    /// Wraps a trained grid, giving every neuron the same starting variance.
    pub fn new(grid: Grid, initial_sigma: f64) -> Result<Self> {
        if !(initial_sigma > 0.0) {
            return Err(CartographerError::Config(format!(
                "initial sigma {initial_sigma} must be positive"
            )));
        }
        let range = grid.range();
        Ok(Self {
            grid,
            sigma: vec![initial_sigma; range],
            cardinality: vec![0; range],
        })
    }

    /// Reassembles a map from persisted parts.
    pub fn from_parts(grid: Grid, sigma: Vec<f64>, cardinality: Vec<usize>) -> Result<Self> {
        grid.validate()?;
        CartographerError::check_dim(grid.range(), sigma.len())?;
        CartographerError::check_dim(grid.range(), cardinality.len())?;
        if let Some(bad) = sigma.iter().find(|s| !(**s > 0.0)) {
            return Err(CartographerError::Config(format!("non-positive sigma {bad}")));
        }
        Ok(Self {
            grid,
            sigma,
            cardinality,
        })
    }

    /// The underlying grid.
    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The underlying grid, mutably.
    #[inline]
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    /// Consumes the map, returning the grid.
    pub fn into_grid(self) -> Grid {
        self.grid
    }

    /// Consumes the map, returning grid, sigmas and cardinalities.
    pub fn into_parts(self) -> (Grid, Vec<f64>, Vec<usize>) {
        (self.grid, self.sigma, self.cardinality)
    }

    /// Number of neurons.
    #[inline]
    pub fn range(&self) -> usize {
        self.grid.range()
    }

    /// Per-neuron standard deviations.
    #[inline]
    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    /// Per-neuron standard deviations, mutably.
    #[inline]
    pub(crate) fn sigma_mut(&mut self) -> &mut [f64] {
        &mut self.sigma
    }

    /// Per-neuron sample counts from the latest assignment pass.
    #[inline]
    pub fn cardinality(&self) -> &[usize] {
        &self.cardinality
    }

    pub(crate) fn set_cardinality(&mut self, cardinality: Vec<usize>) {
        debug_assert_eq!(cardinality.len(), self.range());
        self.cardinality = cardinality;
    }

    /// Natural log of [`ProbabilisticMap::density`].
    #[inline]
    pub fn log_density(&self, input: &[f64], cell: usize) -> f64 {
        let sigma = self.sigma[cell];
        let sq = self.grid.cell(cell).squared_distance(input);
        -0.5 * sq / (sigma * sigma) - input.len() as f64 * (sigma.ln() + LN_SQRT_2PI)
    }

    /// Gaussian density of `input` under neuron `cell`:
    /// `exp(-0.5 * |x - w|^2 / sigma^2) / (sigma * sqrt(2 pi))^D`.
    #[inline]
    pub fn density(&self, input: &[f64], cell: usize) -> f64 {
        self.log_density(input, cell).exp()
    }

    /// Densities of `input` under every neuron, all multiplied by the same
    /// factor so that the largest is 1. Ratios between neurons (and hence
    /// any normalised probability) are unchanged, but nothing underflows.
    pub fn relative_densities(&self, input: &[f64]) -> Vec<f64> {
        let logs: Vec<f64> = (0..self.range()).map(|c| self.log_density(input, c)).collect();
        let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        logs.into_iter().map(|l| (l - max).exp()).collect()
    }

    /// The neuron of maximum density, with its log density.
    ///
    /// Ties go to the lowest offset.
    pub fn winner(&self, input: &[f64]) -> Result<(usize, f64)> {
        CartographerError::check_dim(self.grid.dim(), input.len())?;
        Ok(self.winner_unchecked(input))
    }

    #[inline]
    pub(crate) fn winner_unchecked(&self, input: &[f64]) -> (usize, f64) {
        let mut best_idx = 0;
        let mut best = f64::NEG_INFINITY;
        for cell in 0..self.range() {
            let l = self.log_density(input, cell);
            if l > best {
                best = l;
                best_idx = cell;
            }
        }
        (best_idx, best)
    }

    /// Cardinality-weighted posterior activation of every neuron for `input`.
    ///
    /// Returns `None` when every weighted density is zero (no neuron has any
    /// samples), since the activations are undefined then.
    pub fn activations(&self, input: &[f64]) -> Option<Vec<f64>> {
        let mut weights = self.relative_densities(input);
        for (w, &card) in weights.iter_mut().zip(&self.cardinality) {
            *w *= card as f64;
        }
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) {
            return None;
        }
        for w in &mut weights {
            *w /= total;
        }
        Some(weights)
    }

    /// Activations above `min_probability` as `(offset, value)` pairs.
    pub fn sparse_activations(&self, input: &[f64], min_probability: f64) -> Vec<(usize, f64)> {
        match self.activations(input) {
            Some(weights) => weights
                .into_iter()
                .enumerate()
                .filter(|&(_, a)| a > min_probability)
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Vector;

    fn two_cells(a: f64, b: f64) -> Grid {
        Grid::from_cells(
            &[2],
            &[0.0],
            &[1.0],
            vec![Vector::from_vec(vec![a]), Vector::from_vec(vec![b])],
        )
        .unwrap()
    }

    #[test]
    fn test_density_at_mean() {
        let map = ProbabilisticMap::new(two_cells(0.0, 1.0), 1.0).unwrap();
        let expected = 1.0 / (2.0 * std::f64::consts::PI).sqrt();
        assert!((map.density(&[0.0], 0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_density_formula_multidim() {
        let grid = Grid::from_cells(&[1], &[0.0], &[1.0], vec![Vector::from_vec(vec![0.0, 0.0])])
            .unwrap();
        let map = ProbabilisticMap::from_parts(grid, vec![2.0], vec![1]).unwrap();
        let x = [1.0, 1.0];
        let norm = (2.0 * (2.0 * std::f64::consts::PI).sqrt()).powi(2);
        let expected = (-0.5 * 2.0 / 4.0f64).exp() / norm;
        assert!((map.density(&x, 0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_winner_is_max_density_not_nearest() {
        let map =
            ProbabilisticMap::from_parts(two_cells(0.0, 1.0), vec![0.1, 10.0], vec![1, 1]).unwrap();
        // 0.4 is nearer cell 0, but cell 1 is far wider.
        let (winner, _) = map.winner(&[0.4]).unwrap();
        assert_eq!(winner, 1);
        assert!(map.winner(&[0.4, 0.0]).is_err());
    }

    #[test]
    fn test_relative_densities_preserve_ratios() {
        let map = ProbabilisticMap::new(two_cells(0.0, 1.0), 0.5).unwrap();
        let rel = map.relative_densities(&[0.2]);
        let ratio = map.density(&[0.2], 1) / map.density(&[0.2], 0);
        assert!((rel[0] - 1.0).abs() < 1e-12);
        assert!((rel[1] / rel[0] - ratio).abs() < 1e-12);
    }

    #[test]
    fn test_activations_need_cardinality() {
        let mut map = ProbabilisticMap::new(two_cells(0.0, 1.0), 0.5).unwrap();
        assert!(map.activations(&[0.2]).is_none());
        assert!(map.sparse_activations(&[0.2], 0.0).is_empty());

        map.set_cardinality(vec![3, 1]);
        let act = map.activations(&[0.2]).unwrap();
        assert!((act.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(act[0] > act[1]);

        let sparse = map.sparse_activations(&[0.0], 0.5);
        assert_eq!(sparse.len(), 1);
        assert_eq!(sparse[0].0, 0);
    }

    #[test]
    fn test_rejects_bad_parts() {
        assert!(ProbabilisticMap::new(two_cells(0.0, 1.0), 0.0).is_err());
        assert!(ProbabilisticMap::from_parts(two_cells(0.0, 1.0), vec![1.0], vec![0, 0]).is_err());
        assert!(ProbabilisticMap::from_parts(two_cells(0.0, 1.0), vec![1.0, -1.0], vec![0, 0]).is_err());
    }
}
