//! Probabilistic Self-Organizing Map (PRSOM).
//!
//! Extends a trained SOM lattice with one Gaussian variance per neuron so
//! that every neuron defines a density over the feature space.

mod map;
pub mod training;

pub use map::ProbabilisticMap;
pub use training::{CycleOptions, Phase, PrsomCycle, PrsomReport, PrsomTrainer};
