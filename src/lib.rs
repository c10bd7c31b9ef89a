//! # Cartographer - SOM / PRSOM / HAC Classification Engine
//!
//! Cartographer classifies fixed-dimension numeric feature vectors with a
//! Kohonen Self-Organizing Map, refines the map into a mixture of Gaussian
//! densities (PRSOM), and groups its neurons into classes by hierarchical
//! agglomerative clustering, optionally guided by partially known labels.
//!
//! ## Key Features
//!
//! - **Self-Organizing Map (SOM)** on N-dimensional lattices, incremental or batch
//! - **Probabilistic SOM** with per-neuron variances and posterior activations
//! - **Hierarchical clustering** with eight Lance-Williams linkage criteria
//! - **Label constraints**: clusters never mix two different known labels
//! - **Class probability ranking** for new samples
//! - **Text and binary persistence** for datasets, grids and trained models
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cartographer::{Config, Dataset, Pipeline};
//!
//! let mut train = Dataset::from_rows(rows)?.with_labels(labels)?;
//! let output = Pipeline::run(&Config::default(), &mut train, None)?;
//!
//! output.model.save("model.bin", false)?;
//! for ranking in output.rankings.iter().flatten() {
//!     println!("{:?}", ranking);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`linalg`] - Vectors, grid indices and triangular matrices
//! - [`dataset`] - Samples, per-sample scratch fields, run statistics
//! - [`som`] - Grid and SOM training
//! - [`prsom`] - Probabilistic map and its training
//! - [`hac`] - Agglomerative clustering of neurons or samples
//! - [`classify`] - Cell labeling and class probability ranking
//! - [`storage`] - Text formats and binary model snapshots
//! - [`pipeline`] - The whole chain in one call

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod config;
pub mod dataset;
pub mod error;
pub mod hac;
pub mod linalg;
pub mod pipeline;
pub mod prsom;
pub mod som;
pub mod storage;

// Re-export commonly used types
pub use classify::{class_probabilities, majority_vote, top_k, ClassScore, Classifier};
pub use config::{Annealing, ClassifyConfig, Config, GridInit, HacConfig, PrsomConfig, SomConfig, StorageConfig};
pub use dataset::{Dataset, RunStats, SampleInfo};
pub use error::{CartographerError, Result};
pub use hac::{Agglomeration, Agglomerator, HacInput, Linkage, Merge, StopRule};
pub use linalg::{GridIndex, Vector};
pub use pipeline::{Pipeline, PipelineOutput};
pub use prsom::{ProbabilisticMap, PrsomTrainer};
pub use som::{Grid, SomTrainer, TrainingReport};
pub use storage::{Annotation, Model, TextFormat};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
