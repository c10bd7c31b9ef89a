//! SOM training algorithms.
//!
//! Competitive learning over full passes of the training set. The learning
//! rate and neighborhood radius decay exponentially between their maximum
//! and minimum, either once per pass or once per presented sample. Updates
//! are applied immediately (incremental mode) or after every winner of the
//! pass has been found on the frozen map (batch mode).

use crate::config::{Annealing, SomConfig};
use crate::dataset::{Dataset, RunStats};
use crate::error::{CartographerError, Result};
use crate::som::grid::{neighborhood, Grid};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Summary of one training cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleStats {
    /// Zero-based cycle number.
    pub cycle: usize,
    /// Learning rate at the end of the cycle.
    pub learning_rate: f64,
    /// Neighborhood radius at the end of the cycle.
    pub smooth_distance: f64,
    /// Test-set statistics, when this cycle was evaluated.
    pub quality: Option<RunStats>,
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Number of passes actually performed.
    pub cycles_run: usize,
    /// True when training stopped because RMS and contrast stopped changing.
    pub converged_early: bool,
    /// Every cycle, in order.
    pub history: Vec<CycleStats>,
    /// Statistics of the final evaluation pass.
    pub final_stats: RunStats,
}

/// SOM trainer with configurable annealing schedules.
pub struct SomTrainer {
    config: SomConfig,
    rng: ChaCha8Rng,
}

impl SomTrainer {
    /// Creates a new trainer, rejecting invalid schedules up front.
    pub fn new(config: SomConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Ok(Self { config, rng })
    }

    /// The trainer's configuration.
    pub fn config(&self) -> &SomConfig {
        &self.config
    }

    /// Learning rate at progress `t` in `[0, 1]`.
    #[inline]
    pub fn learning_rate(&self, t: f64) -> f64 {
        anneal(self.config.learning_rate_max, self.config.learning_rate_min, t)
    }

    /// Neighborhood radius at progress `t` in `[0, 1]`.
    #[inline]
    pub fn smooth_distance(&self, t: f64) -> f64 {
        anneal(self.config.smooth_distance_max, self.config.smooth_distance_min, t)
    }

    /// Trains `grid` on `train`; statistics are computed on `test`, or on
    /// `train` when no test set is given.
    pub fn train(
        &mut self,
        grid: &mut Grid,
        train: &mut Dataset,
        test: Option<&mut Dataset>,
    ) -> Result<TrainingReport> {
        self.train_with_progress(grid, train, test, |_| {})
    }

    /// Like [`SomTrainer::train`], calling `progress` after every cycle.
    pub fn train_with_progress<F>(
        &mut self,
        grid: &mut Grid,
        train: &mut Dataset,
        mut test: Option<&mut Dataset>,
        mut progress: F,
    ) -> Result<TrainingReport>
    where
        F: FnMut(&CycleStats),
    {
        if train.is_empty() {
            return Err(CartographerError::EmptyInput("No training samples provided".to_string()));
        }
        CartographerError::check_dim(grid.dim(), train.dim())?;
        if let Some(test) = test.as_deref() {
            CartographerError::check_dim(grid.dim(), test.dim())?;
        }

        let cycles = self.config.cycles;
        let n = train.len();
        let total_steps = cycles * n;
        let threshold = self.config.threshold_neighborhood;

        info!(
            "Training SOM: {} samples, {} neurons {:?}, {} dim, {} cycles ({})",
            n,
            grid.range(),
            grid.sizes(),
            grid.dim(),
            cycles,
            if self.config.batch { "batch" } else { "incremental" }
        );

        let mut order: Vec<usize> = (0..n).collect();
        let mut history = Vec::with_capacity(cycles);
        let mut previous: Option<(f64, f64)> = None;
        let mut converged_early = false;
        let mut step = 0usize;
        let mut lr = self.learning_rate(0.0);
        let mut smooth = self.smooth_distance(0.0);

        for cycle in 0..cycles {
            if self.config.shuffle {
                order.shuffle(&mut self.rng);
            }

            if self.config.annealing == Annealing::PerCycle {
                let t = if cycles > 1 {
                    cycle as f64 / (cycles - 1) as f64
                } else {
                    0.0
                };
                lr = self.learning_rate(t);
                smooth = self.smooth_distance(t);
            }

            let samples = train.samples();
            let winners: Option<Vec<usize>> = if self.config.batch {
                Some(
                    order
                        .par_iter()
                        .map(|&i| grid.winner_unchecked(&samples[i]).0)
                        .collect(),
                )
            } else {
                None
            };

            for (k, &i) in order.iter().enumerate() {
                if self.config.annealing == Annealing::Stochastic {
                    let t = if total_steps > 1 {
                        step as f64 / (total_steps - 1) as f64
                    } else {
                        0.0
                    };
                    lr = self.learning_rate(t);
                    smooth = self.smooth_distance(t);
                }

                let x = &samples[i];
                let winner = match &winners {
                    Some(winners) => winners[k],
                    None => grid.winner_unchecked(x).0,
                };
                update(grid, x, winner, lr, smooth, threshold);
                step += 1;
            }

            let last = cycle + 1 == cycles;
            let quality = if last || (cycle + 1) % self.config.test_frequency == 0 {
                let target: &mut Dataset = match test.as_deref_mut() {
                    Some(test) => test,
                    None => &mut *train,
                };
                let (rms, _) = target.evaluate(grid)?;
                if !rms.is_finite() {
                    return Err(CartographerError::Training(format!(
                        "map diverged at cycle {} (rms {rms})",
                        cycle + 1
                    )));
                }
                Some(*target.stats())
            } else {
                None
            };

            let stats = CycleStats {
                cycle,
                learning_rate: lr,
                smooth_distance: smooth,
                quality,
            };
            progress(&stats);
            history.push(stats);

            if let Some(q) = quality {
                debug!(
                    "Cycle {}/{}: lr={:.4}, smooth={:.3}, rms={:.6}, contrast={:.4}",
                    cycle + 1,
                    cycles,
                    lr,
                    smooth,
                    q.rms,
                    q.contrast
                );
                if previous == Some((q.rms, q.contrast)) {
                    converged_early = !last;
                    break;
                }
                previous = Some((q.rms, q.contrast));
            }
        }

        // Keep the training set's winners in step with the final map.
        if test.is_some() {
            train.evaluate(grid)?;
        }

        let final_stats = match test.as_deref() {
            Some(test) => *test.stats(),
            None => *train.stats(),
        };

        info!(
            "SOM training completed after {} cycles: rms={:.6} (best {:.6}), contrast={:.4}",
            history.len(),
            final_stats.rms,
            final_stats.best_rms,
            final_stats.contrast
        );

        Ok(TrainingReport {
            cycles_run: history.len(),
            converged_early,
            history,
            final_stats,
        })
    }
}

/// `max * (min / max)^t`.
#[inline]
pub fn anneal(max: f64, min: f64, t: f64) -> f64 {
    max * (min / max).powf(t)
}

/// Pulls every cell near `winner` towards `input`.
fn update(grid: &mut Grid, input: &[f64], winner: usize, lr: f64, smooth: f64, threshold: f64) {
    for cell in 0..grid.range() {
        let h = neighborhood(grid.grid_distance(winner, cell), smooth);
        if h < threshold {
            continue;
        }
        grid.cell_mut(cell).pull_towards(input, lr * h);
    }
}
