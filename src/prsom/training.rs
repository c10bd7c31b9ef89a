//! PRSOM training: variance and mean estimation on a SOM lattice.
//!
//! Each cycle assigns every sample to its maximum-density neuron, then
//! re-estimates each neuron from the samples whose winner lies within
//! `smooth` lattice steps, weighted by `exp(-0.5 * d / smooth)`.
//!
//! A full run has three phases:
//!
//! 1. variance only, means frozen, fixed radius;
//! 2. means and variances, radius annealed from max to min;
//! 3. one assignment-only pass that fixes statistics and cardinalities.

use crate::config::PrsomConfig;
use crate::dataset::{contrast, rms, Dataset, RunStats};
use crate::error::{CartographerError, Result};
use crate::linalg::Vector;
use crate::prsom::ProbabilisticMap;
use crate::som::{anneal, neighborhood};
use log::{debug, info};
use rayon::prelude::*;

/// Radius of the final assignment pass: only the winner itself counts.
const ASSIGNMENT_SMOOTH_DISTANCE: f64 = 1.0 + 1e-3;

/// What a single cycle re-estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOptions {
    /// Neighborhood radius in lattice steps.
    pub smooth_distance: f64,
    /// Re-estimate neuron means.
    pub update_mean: bool,
    /// Re-estimate neuron variances.
    pub update_variance: bool,
}

/// Which part of the run a cycle belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Variance refinement with frozen means.
    Variance,
    /// Joint mean and variance refinement with an annealed radius.
    Mean,
    /// Final assignment pass.
    Assignment,
}

/// Summary of one PRSOM cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrsomCycle {
    /// Run phase.
    pub phase: Phase,
    /// Radius used.
    pub smooth_distance: f64,
    /// Statistics after the cycle's assignment pass.
    pub stats: RunStats,
}

/// Outcome of a full PRSOM run.
#[derive(Debug, Clone)]
pub struct PrsomReport {
    /// Every cycle, in order.
    pub history: Vec<PrsomCycle>,
    /// Statistics of the final assignment pass.
    pub final_stats: RunStats,
}

/// Per-neuron re-estimate produced by the accumulation pass.
struct Estimate {
    mean: Option<Vector>,
    sigma: Option<f64>,
}

/// PRSOM trainer.
pub struct PrsomTrainer {
    config: PrsomConfig,
}

impl PrsomTrainer {
    /// Creates a trainer, rejecting invalid settings up front.
    pub fn new(config: PrsomConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Wraps a trained grid in a map with the configured starting variance.
    pub fn init_map(&self, grid: crate::som::Grid) -> Result<ProbabilisticMap> {
        ProbabilisticMap::new(grid, self.config.initial_sigma)
    }

    /// Runs the three-phase schedule.
    pub fn train(&self, map: &mut ProbabilisticMap, data: &mut Dataset) -> Result<PrsomReport> {
        if data.is_empty() {
            return Err(CartographerError::EmptyInput("No training samples provided".to_string()));
        }
        CartographerError::check_dim(map.grid().dim(), data.dim())?;

        info!(
            "Training PRSOM: {} samples, {} neurons, {} variance + {} mean cycles",
            data.len(),
            map.range(),
            self.config.variance_cycles,
            self.config.mean_cycles
        );

        let mut history = Vec::new();

        for _ in 0..self.config.variance_cycles {
            let options = CycleOptions {
                smooth_distance: self.config.smooth_distance,
                update_mean: false,
                update_variance: true,
            };
            let stats = self.cycle(map, data, options)?;
            history.push(PrsomCycle {
                phase: Phase::Variance,
                smooth_distance: options.smooth_distance,
                stats,
            });
        }

        let mean_cycles = self.config.mean_cycles;
        for cycle in 0..mean_cycles {
            let t = if mean_cycles > 1 {
                cycle as f64 / (mean_cycles - 1) as f64
            } else {
                0.0
            };
            let options = CycleOptions {
                smooth_distance: anneal(
                    self.config.smooth_distance_max,
                    self.config.smooth_distance_min,
                    t,
                ),
                update_mean: true,
                update_variance: true,
            };
            let stats = self.cycle(map, data, options)?;
            history.push(PrsomCycle {
                phase: Phase::Mean,
                smooth_distance: options.smooth_distance,
                stats,
            });
        }

        let options = CycleOptions {
            smooth_distance: ASSIGNMENT_SMOOTH_DISTANCE,
            update_mean: false,
            update_variance: false,
        };
        let final_stats = self.cycle(map, data, options)?;
        history.push(PrsomCycle {
            phase: Phase::Assignment,
            smooth_distance: options.smooth_distance,
            stats: final_stats,
        });

        info!(
            "PRSOM training completed: rms={:.6}, contrast={:.4}",
            final_stats.rms, final_stats.contrast
        );

        Ok(PrsomReport {
            history,
            final_stats,
        })
    }

    /// Runs one cycle: assignment, then the requested re-estimates.
    ///
    /// Winners, errors and densities are written to `data`, cardinalities
    /// to `map`. Errors used by the variance estimate are measured against
    /// the means at the start of the cycle.
    pub fn cycle(
        &self,
        map: &mut ProbabilisticMap,
        data: &mut Dataset,
        options: CycleOptions,
    ) -> Result<RunStats> {
        CartographerError::check_dim(map.grid().dim(), data.dim())?;
        if !(options.smooth_distance > 0.0) {
            return Err(CartographerError::Config(format!(
                "smooth distance {} must be positive",
                options.smooth_distance
            )));
        }

        let assignments: Vec<(usize, f64)> = data
            .samples()
            .par_iter()
            .map(|x| map.winner_unchecked(x))
            .collect();
        let winners: Vec<usize> = assignments.iter().map(|&(w, _)| w).collect();

        let mut counts = vec![0usize; map.range()];
        let mut errors = Vec::with_capacity(winners.len());
        let (samples, infos) = data.samples_and_info_mut();
        for ((x, info), &(winner, log_density)) in samples.iter().zip(infos).zip(&assignments) {
            let error = map.grid().cell(winner).distance(x);
            info.winner = winner;
            info.error = error;
            info.density = log_density.exp();
            counts[winner] += 1;
            errors.push(error);
        }

        if options.update_mean || options.update_variance {
            let estimates = self.estimate(map, data, &winners, options);
            let floor = self.config.sigma_floor;
            for (cell, estimate) in estimates.into_iter().enumerate() {
                if let Some(mean) = estimate.mean {
                    *map.grid_mut().cell_mut(cell) = mean;
                }
                if let Some(sigma) = estimate.sigma {
                    map.sigma_mut()[cell] = sigma.max(floor);
                }
            }
        }

        let stats_rms = rms(errors.into_iter());
        let stats_contrast = contrast(&counts);
        map.set_cardinality(counts);
        data.stats_mut().record(stats_rms, stats_contrast);

        debug!(
            "PRSOM cycle: smooth={:.3}, mean={}, variance={}, rms={:.6}, contrast={:.4}",
            options.smooth_distance,
            options.update_mean,
            options.update_variance,
            stats_rms,
            stats_contrast
        );

        Ok(*data.stats())
    }

    /// Accumulates weighted errors and sums for every neuron. Read-only, so
    /// neurons are processed in parallel.
    fn estimate(
        &self,
        map: &ProbabilisticMap,
        data: &Dataset,
        winners: &[usize],
        options: CycleOptions,
    ) -> Vec<Estimate> {
        let grid = map.grid();
        let dim = data.dim() as f64;
        let smooth = options.smooth_distance;

        (0..map.range())
            .into_par_iter()
            .map(|cell| {
                let mean = grid.cell(cell);
                let mut weight_sum = 0.0;
                let mut error_sum = 0.0;
                let mut weighted = Vector::zeros(data.dim());

                for (x, &winner) in data.samples().iter().zip(winners) {
                    let d = grid.grid_distance(winner, cell);
                    if d as f64 > smooth {
                        continue;
                    }
                    let w = neighborhood(d, smooth);
                    weight_sum += w;
                    error_sum += w * mean.squared_distance(x);
                    if options.update_mean {
                        weighted.add_scaled(x, w);
                    }
                }

                let mean = if options.update_mean && weight_sum > 0.0 {
                    weighted.scale(1.0 / weight_sum);
                    Some(weighted)
                } else {
                    None
                };
                let sigma = if options.update_variance && weight_sum > 0.0 && error_sum > 0.0 {
                    Some((error_sum / (dim * weight_sum)).sqrt())
                } else {
                    None
                };
                Estimate { mean, sigma }
            })
            .collect()
    }

    /// Sparse activation rows for every sample, omitting values at or below
    /// the configured minimum probability.
    pub fn export_activations(&self, map: &ProbabilisticMap, data: &Dataset) -> Vec<Vec<(usize, f64)>> {
        data.samples()
            .par_iter()
            .map(|x| map.sparse_activations(x, self.config.min_probability))
            .collect()
    }
}
