//! Labeling of map cells and class probability ranking.

mod ranking;
mod vote;

pub use ranking::{class_probabilities, top_k, ClassScore, Classifier};
pub use vote::majority_vote;
