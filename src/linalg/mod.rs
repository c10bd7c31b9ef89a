//! Numeric primitives: vectors, triangular matrices and lattice indices.

mod index;
mod matrix;
mod vector;

pub use index::{lattice_size, GridIndex};
pub use matrix::SymmetricMatrix;
pub use vector::{squared_distance, Vector};
