//! Hierarchical agglomerative clustering (HAC).
//!
//! - **Criteria**: eight linkage rules with Lance-Williams updates (criterion.rs)
//! - **Engine**: label-constrained merging until a stop rule holds (engine.rs)
//! - **Labels**: back-propagation of labels down the merge forest (labels.rs)

mod criterion;
mod engine;
mod labels;

pub use criterion::Linkage;
pub use engine::{Agglomeration, Agglomerator, HacInput, Merge, StopRule};
