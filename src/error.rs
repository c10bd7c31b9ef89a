//! Error types for the Cartographer classification engine.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Cartographer operations.
#[derive(Error, Debug)]
pub enum CartographerError {
    /// Invalid configuration, rejected before any computation starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A vector does not have the dimension its container declares.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// The declared dimension.
        expected: usize,
        /// The dimension actually encountered.
        found: usize,
    },

    /// Empty input.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Linkage criterion code outside 1..=8.
    #[error("Unknown linkage criterion: {0}")]
    UnknownCriterion(u8),

    /// Error during SOM or PRSOM training.
    #[error("Training error: {0}")]
    Training(String),

    /// Corrupted cluster state. Not recoverable: the caller should abandon
    /// the session that produced it.
    #[error("Inconsistent cluster state: {0}")]
    Inconsistent(String),

    /// Malformed persisted data.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Refusing to overwrite an existing output file.
    #[error("Output already exists: {0}")]
    OutputExists(PathBuf),

    /// Index out of bounds.
    #[error("Index out of bounds: {index} >= {max}")]
    IndexOutOfBounds {
        /// The index that was out of bounds.
        index: usize,
        /// The maximum allowed index.
        max: usize,
    },
}

/// Result type alias for Cartographer operations.
pub type Result<T> = std::result::Result<T, CartographerError>;

impl From<bincode::Error> for CartographerError {
    fn from(err: bincode::Error) -> Self {
        CartographerError::Serialization(err.to_string())
    }
}

impl CartographerError {
    /// Shorthand for a dimension check failure.
    pub(crate) fn check_dim(expected: usize, found: usize) -> Result<()> {
        if expected == found {
            Ok(())
        } else {
            Err(CartographerError::DimensionMismatch { expected, found })
        }
    }
}
