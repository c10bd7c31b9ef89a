//! Dense real vectors.

use crate::error::{CartographerError, Result};
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Deref, DerefMut, SubAssign};

/// A fixed-dimension vector of `f64` components.
///
/// Used uniformly for dataset samples, neuron weights and scratch values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    data: Vec<f64>,
}

impl Vector {
    /// Creates a zero vector of the given dimension.
    pub fn zeros(dim: usize) -> Self {
        Self {
            data: vec![0.0; dim],
        }
    }

    /// Creates a vector with every component set to `value`.
    pub fn filled(dim: usize, value: f64) -> Self {
        Self {
            data: vec![value; dim],
        }
    }

    /// Wraps the given components.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Returns the dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    /// Borrows the components.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutably borrows the components.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consumes the vector and returns its components.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.quadratic_norm().sqrt()
    }

    /// Sum of squared components.
    pub fn quadratic_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Sum of absolute components.
    pub fn absolute_norm(&self) -> f64 {
        self.data.iter().map(|v| v.abs()).sum()
    }

    /// Euclidean distance to another vector of the same dimension.
    #[inline]
    pub fn distance(&self, other: &[f64]) -> f64 {
        squared_distance(&self.data, other).sqrt()
    }

    /// Squared Euclidean distance (avoids the sqrt).
    #[inline]
    pub fn squared_distance(&self, other: &[f64]) -> f64 {
        squared_distance(&self.data, other)
    }

    /// L1 distance.
    pub fn absolute_distance(&self, other: &[f64]) -> f64 {
        debug_assert_eq!(self.data.len(), other.len());
        self.data
            .iter()
            .zip(other)
            .map(|(a, b)| (a - b).abs())
            .sum()
    }

    /// Moves this vector towards `target` by `rate`: `self += rate * (target - self)`.
    #[inline]
    pub fn pull_towards(&mut self, target: &[f64], rate: f64) {
        debug_assert_eq!(self.data.len(), target.len());
        for (w, x) in self.data.iter_mut().zip(target) {
            *w += rate * (x - *w);
        }
    }

    /// Adds `scale * other` component-wise.
    #[inline]
    pub fn add_scaled(&mut self, other: &[f64], scale: f64) {
        debug_assert_eq!(self.data.len(), other.len());
        for (a, b) in self.data.iter_mut().zip(other) {
            *a += scale * b;
        }
    }

    /// Multiplies every component by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Checks that `other` has the same dimension.
    pub fn check_same_dim(&self, other: &[f64]) -> Result<()> {
        CartographerError::check_dim(self.data.len(), other.len())
    }
}

impl Deref for Vector {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for Vector {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl From<Vec<f64>> for Vector {
    fn from(data: Vec<f64>) -> Self {
        Self { data }
    }
}

impl AddAssign<&Vector> for Vector {
    fn add_assign(&mut self, rhs: &Vector) {
        debug_assert_eq!(self.data.len(), rhs.data.len());
        for (a, b) in self.data.iter_mut().zip(&rhs.data) {
            *a += b;
        }
    }
}

impl SubAssign<&Vector> for Vector {
    fn sub_assign(&mut self, rhs: &Vector) {
        debug_assert_eq!(self.data.len(), rhs.data.len());
        for (a, b) in self.data.iter_mut().zip(&rhs.data) {
            *a -= b;
        }
    }
}

/// Squared Euclidean distance between two slices of equal length.
#[inline]
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
