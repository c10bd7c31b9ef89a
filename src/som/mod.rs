//! Self-Organizing Map (SOM) module.
//!
//! - **Grid**: N-dimensional lattice of neuron weight vectors (grid.rs)
//! - **Training**: annealed competitive learning, incremental or batch (training.rs)

mod grid;
pub mod training;

pub use grid::{neighborhood, Grid};
pub use training::{anneal, CycleStats, SomTrainer, TrainingReport};
