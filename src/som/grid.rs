//! N-dimensional lattice of neuron weight vectors.

use crate::config::{GridInit, SomConfig};
use crate::error::{CartographerError, Result};
use crate::linalg::{lattice_size, GridIndex, Vector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A Self-Organizing Map lattice.
///
/// The lattice has a fixed geometry (`sizes`) chosen at creation. Cells are
/// stored in row-major offset order, so a cell's multi-index is derived from
/// its offset rather than stored. Only the weight vectors change during
/// training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Lattice extent along each axis.
    sizes: Vec<usize>,
    /// Lower initialisation bound per feature.
    min: Vector,
    /// Upper initialisation bound per feature.
    max: Vector,
    /// Neuron weight vectors in offset order.
    cells: Vec<Vector>,
}

impl Grid {
    /// Creates a grid whose weights interpolate linearly between the bounds.
    ///
    /// Feature `j` follows lattice axis `j mod k`: a cell at coordinate `c`
    /// on an axis of size `s` sits at fraction `c / (s - 1)` between
    /// `min[j]` and `max[j]` (the midpoint when `s == 1`).
    pub fn new_linear(sizes: &[usize], min: &[f64], max: &[f64], dim: usize) -> Result<Self> {
        let (range, min, max) = Self::check_geometry(sizes, min, max, dim)?;
        let axes = sizes.len();

        let mut cells = Vec::with_capacity(range);
        for offset in 0..range {
            let index = GridIndex::from_offset(offset, sizes)?;
            let weights: Vec<f64> = (0..dim)
                .map(|j| {
                    let axis = j % axes;
                    let size = sizes[axis];
                    let t = if size > 1 {
                        index.coords()[axis] as f64 / (size - 1) as f64
                    } else {
                        0.5
                    };
                    min[j] + t * (max[j] - min[j])
                })
                .collect();
            cells.push(Vector::from_vec(weights));
        }

        Ok(Self {
            sizes: sizes.to_vec(),
            min,
            max,
            cells,
        })
    }

    /// Creates a grid with weights drawn uniformly between the bounds.
    pub fn new_random(
        sizes: &[usize],
        min: &[f64],
        max: &[f64],
        dim: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        let (range, min, max) = Self::check_geometry(sizes, min, max, dim)?;

        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let cells = (0..range)
            .map(|_| {
                let weights: Vec<f64> = (0..dim)
                    .map(|j| min[j] + rng.gen::<f64>() * (max[j] - min[j]))
                    .collect();
                Vector::from_vec(weights)
            })
            .collect();

        Ok(Self {
            sizes: sizes.to_vec(),
            min,
            max,
            cells,
        })
    }

    /// Creates a grid as described by a SOM configuration.
    pub fn from_config(config: &SomConfig, dim: usize) -> Result<Self> {
        match config.init {
            GridInit::Linear => Self::new_linear(&config.sizes, &config.min, &config.max, dim),
            GridInit::Random => {
                Self::new_random(&config.sizes, &config.min, &config.max, dim, config.seed)
            }
        }
    }

    /// Creates a grid from existing weight vectors, e.g. when loading one.
    pub fn from_cells(sizes: &[usize], min: &[f64], max: &[f64], cells: Vec<Vector>) -> Result<Self> {
        let dim = cells.first().map(Vector::dim).unwrap_or(0);
        let (min, max) = (expand_bounds(min, dim)?, expand_bounds(max, dim)?);
        let grid = Self {
            sizes: sizes.to_vec(),
            min,
            max,
            cells,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Re-checks the geometry of a grid that bypassed the constructors,
    /// e.g. one deserialized from a snapshot.
    pub(crate) fn validate(&self) -> Result<()> {
        let dim = self.min.dim();
        let (range, _, _) = Self::check_geometry(&self.sizes, &self.min, &self.max, dim)?;
        CartographerError::check_dim(range, self.cells.len())?;
        CartographerError::check_dim(dim, self.max.dim())?;
        for cell in &self.cells {
            CartographerError::check_dim(dim, cell.dim())?;
        }
        Ok(())
    }

    fn check_geometry(
        sizes: &[usize],
        min: &[f64],
        max: &[f64],
        dim: usize,
    ) -> Result<(usize, Vector, Vector)> {
        if sizes.is_empty() || sizes.iter().any(|&s| s == 0) {
            return Err(CartographerError::Config(format!(
                "grid geometry {sizes:?} has no cells"
            )));
        }
        let range = lattice_size(sizes).ok_or_else(|| {
            CartographerError::Config(format!("grid geometry {sizes:?} overflows"))
        })?;
        if dim == 0 {
            return Err(CartographerError::Config("feature dimension is zero".to_string()));
        }
        Ok((range, expand_bounds(min, dim)?, expand_bounds(max, dim)?))
    }

    /// Lattice extent along each axis.
    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Number of lattice axes.
    #[inline]
    pub fn axes(&self) -> usize {
        self.sizes.len()
    }

    /// Returns the total number of neurons.
    #[inline]
    pub fn range(&self) -> usize {
        self.cells.len()
    }

    /// Weight vector dimensionality.
    #[inline]
    pub fn dim(&self) -> usize {
        self.min.dim()
    }

    /// Lower initialisation bound.
    pub fn min(&self) -> &Vector {
        &self.min
    }

    /// Upper initialisation bound.
    pub fn max(&self) -> &Vector {
        &self.max
    }

    /// Gets a neuron by offset.
    #[inline]
    pub fn cell(&self, offset: usize) -> &Vector {
        &self.cells[offset]
    }

    /// Gets a mutable neuron by offset.
    #[inline]
    pub fn cell_mut(&mut self, offset: usize) -> &mut Vector {
        &mut self.cells[offset]
    }

    /// All neurons in offset order.
    #[inline]
    pub fn cells(&self) -> &[Vector] {
        &self.cells
    }

    /// All neurons in offset order, mutably.
    #[inline]
    pub fn cells_mut(&mut self) -> &mut [Vector] {
        &mut self.cells
    }

    /// Multi-index of the cell at `offset`.
    pub fn index(&self, offset: usize) -> Result<GridIndex> {
        GridIndex::from_offset(offset, &self.sizes)
    }

    /// City-block lattice distance between two cells given by offset.
    #[inline]
    pub fn grid_distance(&self, a: usize, b: usize) -> usize {
        debug_assert!(a < self.range() && b < self.range());
        let mut a = a;
        let mut b = b;
        let mut distance = 0;
        for &size in self.sizes.iter().rev() {
            distance += (a % size).abs_diff(b % size);
            a /= size;
            b /= size;
        }
        distance
    }

    /// Finds the Best Matching Unit for an input vector.
    ///
    /// Returns the offset of the closest neuron and its Euclidean distance.
    /// Ties go to the lowest offset.
    pub fn find_winner(&self, input: &[f64]) -> Result<(usize, f64)> {
        CartographerError::check_dim(self.dim(), input.len())?;
        Ok(self.winner_unchecked(input))
    }

    #[inline]
    pub(crate) fn winner_unchecked(&self, input: &[f64]) -> (usize, f64) {
        let mut best_idx = 0;
        let mut best_dist = f64::INFINITY;
        for (i, cell) in self.cells.iter().enumerate() {
            let dist = cell.squared_distance(input);
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }
        (best_idx, best_dist.sqrt())
    }
}

/// Neighborhood weight of a cell `distance` lattice steps from the winner:
/// `exp(-0.5 * distance / smooth)`.
#[inline]
pub fn neighborhood(distance: usize, smooth: f64) -> f64 {
    (-0.5 * distance as f64 / smooth).exp()
}

/// Broadcasts a scalar bound, or checks a per-feature one.
fn expand_bounds(bounds: &[f64], dim: usize) -> Result<Vector> {
    match bounds.len() {
        1 => Ok(Vector::filled(dim, bounds[0])),
        n if n == dim => Ok(Vector::from_vec(bounds.to_vec())),
        n => Err(CartographerError::DimensionMismatch {
            expected: dim,
            found: n,
        }),
    }
}
