//! Multi-indices on an N-dimensional lattice.

use crate::error::{CartographerError, Result};
use serde::{Deserialize, Serialize};

/// A position on a `k`-axis lattice.
///
/// Offsets are row-major: the last axis varies fastest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridIndex(Vec<usize>);

impl GridIndex {
    /// Wraps per-axis coordinates.
    pub fn new(coords: Vec<usize>) -> Self {
        Self(coords)
    }

    /// Converts a flat offset to a multi-index.
    pub fn from_offset(offset: usize, sizes: &[usize]) -> Result<Self> {
        let range = lattice_size(sizes).unwrap_or(usize::MAX);
        if offset >= range {
            return Err(CartographerError::IndexOutOfBounds {
                index: offset,
                max: range,
            });
        }

        let mut coords = vec![0; sizes.len()];
        let mut rest = offset;
        for (axis, &size) in sizes.iter().enumerate().rev() {
            coords[axis] = rest % size;
            rest /= size;
        }
        Ok(Self(coords))
    }

    /// Converts back to a flat offset, checking every axis bound.
    pub fn to_offset(&self, sizes: &[usize]) -> Result<usize> {
        CartographerError::check_dim(sizes.len(), self.0.len())?;

        let mut offset = 0;
        for (&coord, &size) in self.0.iter().zip(sizes) {
            if coord >= size {
                return Err(CartographerError::IndexOutOfBounds {
                    index: coord,
                    max: size,
                });
            }
            offset = offset * size + coord;
        }
        Ok(offset)
    }

    /// City-block distance: sum of per-axis absolute differences.
    #[inline]
    pub fn distance(&self, other: &GridIndex) -> usize {
        debug_assert_eq!(self.0.len(), other.0.len());
        self.0
            .iter()
            .zip(&other.0)
            .map(|(&a, &b)| a.abs_diff(b))
            .sum()
    }

    /// Per-axis coordinates.
    #[inline]
    pub fn coords(&self) -> &[usize] {
        &self.0
    }

    /// Number of axes.
    #[inline]
    pub fn axes(&self) -> usize {
        self.0.len()
    }
}

/// Number of cells of a lattice, or `None` if it does not fit in `usize`.
pub fn lattice_size(sizes: &[usize]) -> Option<usize> {
    sizes.iter().try_fold(1usize, |acc, &s| acc.checked_mul(s))
}
