//! Configuration for the Cartographer classification engine.
//!
//! Every engine receives its own immutable section; nothing is global.

use crate::error::{CartographerError, Result};
use crate::hac::{Linkage, StopRule};
use crate::linalg::lattice_size;
use serde::{Deserialize, Serialize};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SOM (Self-Organizing Map) configuration.
    pub som: SomConfig,

    /// Probabilistic SOM configuration.
    pub prsom: PrsomConfig,

    /// Hierarchical clustering configuration.
    pub hac: HacConfig,

    /// Probability ranking configuration.
    pub classify: ClassifyConfig,

    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.som.validate()?;
        if self.prsom.enabled {
            self.prsom.validate()?;
        }
        self.hac.validate()?;
        self.classify.validate()
    }
}

/// How annealing progress is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Annealing {
    /// `t = cycle / (cycles - 1)`, recomputed once per pass.
    PerCycle,
    /// `t = step / (total_steps - 1)`, recomputed for every sample.
    Stochastic,
}

/// How neuron weights are initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridInit {
    /// Linear interpolation between the bounds across the lattice.
    Linear,
    /// Uniform random draw between the bounds.
    Random,
}

/// Self-Organizing Map configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomConfig {
    /// Lattice extent along each axis.
    /// Default: 10 x 10.
    pub sizes: Vec<usize>,

    /// Lower initialisation bound, one value per feature or a single scalar.
    /// Default: [0.0].
    pub min: Vec<f64>,

    /// Upper initialisation bound, one value per feature or a single scalar.
    /// Default: [1.0].
    pub max: Vec<f64>,

    /// Weight initialisation strategy.
    /// Default: Linear.
    pub init: GridInit,

    /// Learning rate at the start of training.
    /// Default: 0.5.
    pub learning_rate_max: f64,

    /// Learning rate at the end of training.
    /// Default: 0.01.
    pub learning_rate_min: f64,

    /// Neighborhood radius (grid units) at the start of training.
    /// Default: 5.0.
    pub smooth_distance_max: f64,

    /// Neighborhood radius (grid units) at the end of training.
    /// Default: 0.5.
    pub smooth_distance_min: f64,

    /// Number of passes over the training set.
    /// Default: 50.
    pub cycles: usize,

    /// Cells whose neighborhood weight falls below this are not updated.
    /// Default: 0.1.
    pub threshold_neighborhood: f64,

    /// Annealing progress definition.
    /// Default: PerCycle.
    pub annealing: Annealing,

    /// Defer weight updates to the end of each pass.
    /// Default: false.
    pub batch: bool,

    /// Recompute test statistics every this many cycles (the last cycle
    /// always gets statistics).
    /// Default: 1.
    pub test_frequency: usize,

    /// Present samples in a fresh random order every cycle.
    /// Default: false.
    pub shuffle: bool,

    /// Random seed for reproducibility.
    /// Default: None (random).
    pub seed: Option<u64>,
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            sizes: vec![10, 10],
            min: vec![0.0],
            max: vec![1.0],
            init: GridInit::Linear,
            learning_rate_max: 0.5,
            learning_rate_min: 0.01,
            smooth_distance_max: 5.0,
            smooth_distance_min: 0.5,
            cycles: 50,
            threshold_neighborhood: 0.1,
            annealing: Annealing::PerCycle,
            batch: false,
            test_frequency: 1,
            shuffle: false,
            seed: None,
        }
    }
}

impl SomConfig {
    /// Returns the total number of neurons in the SOM, or `None` if the
    /// geometry overflows.
    #[inline]
    pub fn total_neurons(&self) -> Option<usize> {
        lattice_size(&self.sizes)
    }

    /// Checks schedule and geometry parameters.
    pub fn validate(&self) -> Result<()> {
        if self.sizes.is_empty() || self.total_neurons().map_or(true, |n| n == 0) {
            return Err(CartographerError::Config(format!(
                "grid geometry {:?} has no cells",
                self.sizes
            )));
        }
        if self.cycles == 0 {
            return Err(CartographerError::Config("cycles must be positive".to_string()));
        }
        if self.annealing == Annealing::Stochastic && self.cycles <= 1 {
            return Err(CartographerError::Config(
                "stochastic annealing requires more than one cycle".to_string(),
            ));
        }
        check_schedule("learning rate", self.learning_rate_max, self.learning_rate_min)?;
        check_schedule("smooth distance", self.smooth_distance_max, self.smooth_distance_min)?;
        if !(0.0..=1.0).contains(&self.threshold_neighborhood) {
            return Err(CartographerError::Config(format!(
                "threshold_neighborhood {} outside [0, 1]",
                self.threshold_neighborhood
            )));
        }
        if self.test_frequency == 0 {
            return Err(CartographerError::Config("test_frequency must be positive".to_string()));
        }
        if self.min.is_empty() || self.max.is_empty() {
            return Err(CartographerError::Config("min/max bounds are empty".to_string()));
        }
        Ok(())
    }
}

/// Probabilistic SOM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrsomConfig {
    /// Run the PRSOM stage in the pipeline.
    /// Default: true.
    pub enabled: bool,

    /// Uniform starting variance of every cell.
    /// Default: 1.0.
    pub initial_sigma: f64,

    /// Smallest variance a cell may take.
    /// Default: 1e-6.
    pub sigma_floor: f64,

    /// Cycles refining variances with means frozen.
    /// Default: 10.
    pub variance_cycles: usize,

    /// Fixed neighborhood radius of the variance-only phase.
    /// Default: 1.0.
    pub smooth_distance: f64,

    /// Cycles annealing the radius and updating means and variances.
    /// Default: 10.
    pub mean_cycles: usize,

    /// Radius at the start of the mean phase.
    /// Default: 2.0.
    pub smooth_distance_max: f64,

    /// Radius at the end of the mean phase.
    /// Default: 0.5.
    pub smooth_distance_min: f64,

    /// Activations at or below this are left out of sparse exports.
    /// Default: 0.01.
    pub min_probability: f64,
}

impl Default for PrsomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_sigma: 1.0,
            sigma_floor: 1e-6,
            variance_cycles: 10,
            smooth_distance: 1.0,
            mean_cycles: 10,
            smooth_distance_max: 2.0,
            smooth_distance_min: 0.5,
            min_probability: 0.01,
        }
    }
}

impl PrsomConfig {
    /// Checks variance and schedule parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_sigma > 0.0) || !(self.sigma_floor > 0.0) {
            return Err(CartographerError::Config(
                "initial_sigma and sigma_floor must be positive".to_string(),
            ));
        }
        if !(self.smooth_distance > 0.0) {
            return Err(CartographerError::Config("smooth_distance must be positive".to_string()));
        }
        check_schedule("smooth distance", self.smooth_distance_max, self.smooth_distance_min)?;
        if !(0.0..1.0).contains(&self.min_probability) {
            return Err(CartographerError::Config(format!(
                "min_probability {} outside [0, 1)",
                self.min_probability
            )));
        }
        Ok(())
    }
}

/// Hierarchical clustering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HacConfig {
    /// Linkage criterion.
    /// Default: Ward.
    pub linkage: Linkage,

    /// Number of clusters to stop at.
    /// Default: 2.
    pub target_clusters: usize,

    /// Merge until every object carries a label instead of stopping at
    /// `target_clusters`.
    /// Default: false.
    pub label_completion: bool,
}

impl Default for HacConfig {
    fn default() -> Self {
        Self {
            linkage: Linkage::Ward,
            target_clusters: 2,
            label_completion: false,
        }
    }
}

impl HacConfig {
    /// The stop rule this configuration selects.
    pub fn stop_rule(&self) -> StopRule {
        if self.label_completion {
            StopRule::LabelCompletion
        } else {
            StopRule::ClusterCount(self.target_clusters)
        }
    }

    /// Checks the target count.
    pub fn validate(&self) -> Result<()> {
        if !self.label_completion && self.target_clusters == 0 {
            return Err(CartographerError::Config(
                "target_clusters must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Class probability ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// Maximum number of classes reported per sample.
    /// Default: 3.
    pub n_choices: usize,

    /// Classes at or below this probability are not reported.
    /// Default: 0.05.
    pub min_probability: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            n_choices: 3,
            min_probability: 0.05,
        }
    }
}

impl ClassifyConfig {
    /// Checks ranking parameters.
    pub fn validate(&self) -> Result<()> {
        if self.n_choices == 0 {
            return Err(CartographerError::Config("n_choices must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.min_probability) {
            return Err(CartographerError::Config(format!(
                "min_probability {} outside [0, 1)",
                self.min_probability
            )));
        }
        Ok(())
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Replace existing output files.
    /// Default: false.
    pub overwrite: bool,

    /// Write grid annotations in the sparse encoding.
    /// Default: false.
    pub sparse_annotations: bool,

    /// Sparse annotations at or below this value are omitted.
    /// Default: 0.0.
    pub annotation_threshold: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            sparse_annotations: false,
            annotation_threshold: 0.0,
        }
    }
}

fn check_schedule(name: &str, max: f64, min: f64) -> Result<()> {
    if !(max > 0.0 && min > 0.0) || !max.is_finite() || !min.is_finite() {
        return Err(CartographerError::Config(format!(
            "{name} bounds must be finite and positive (max {max}, min {min})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.som.total_neurons(), Some(100));
        assert!(config.validate().is_ok());
        assert_eq!(config.hac.stop_rule(), StopRule::ClusterCount(2));
    }

    #[test]
    fn test_som_total_neurons() {
        let config = SomConfig {
            sizes: vec![4, 3, 2],
            ..Default::default()
        };
        assert_eq!(config.total_neurons(), Some(24));
    }

    #[test]
    fn test_rejects_zero_cells() {
        let config = SomConfig {
            sizes: vec![4, 0],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CartographerError::Config(_))));

        let config = SomConfig {
            sizes: vec![1 << 40, 1 << 40],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CartographerError::Config(_))));
    }

    #[test]
    fn test_rejects_single_stochastic_cycle() {
        let config = SomConfig {
            cycles: 1,
            annealing: Annealing::Stochastic,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SomConfig {
            cycles: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_schedule() {
        let config = SomConfig {
            learning_rate_min: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_label_completion_rule() {
        let config = HacConfig {
            target_clusters: 0,
            label_completion: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.stop_rule(), StopRule::LabelCompletion);
    }
}
