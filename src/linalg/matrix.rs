//! Symmetric matrix backed by a flat triangular buffer.

use serde::{Deserialize, Serialize};

/// A symmetric matrix with an implicit zero diagonal.
///
/// Only the strict upper triangle is stored, as one flat array of
/// `n * (n - 1) / 2` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymmetricMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SymmetricMatrix {
    /// Creates an `n x n` symmetric matrix filled with zeros.
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n.saturating_sub(1) / 2],
        }
    }

    /// Matrix order.
    #[inline]
    pub fn order(&self) -> usize {
        self.n
    }

    #[inline]
    fn offset(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        assert!(i != j && j < self.n, "symmetric matrix index ({i}, {j}) invalid");
        // Rows 0..i hold (n-1) + (n-2) + ... + (n-i) entries.
        i * (2 * self.n - i - 1) / 2 + (j - i - 1)
    }

    /// Reads `d(i, j)`; the diagonal is zero.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            0.0
        } else {
            self.data[self.offset(i, j)]
        }
    }

    /// Writes `d(i, j) = d(j, i) = value`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let offset = self.offset(i, j);
        self.data[offset] = value;
    }
}
