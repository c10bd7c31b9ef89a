//! Posterior class probabilities from a labeled probabilistic map.

use crate::config::ClassifyConfig;
use crate::dataset::Dataset;
use crate::error::{CartographerError, Result};
use crate::prsom::ProbabilisticMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One ranked class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    /// Class label (never 0).
    pub label: u32,
    /// Posterior probability.
    pub probability: f64,
}

/// `p(k | x)` for every class `k` labeling at least one cell, in ascending
/// label order.
///
/// Each cell contributes `cardinality * density(x)` to its own label.
/// Unlabeled cells are left out of both numerator and denominator, so the
/// denominator is the mass of labeled cells rather than the mass of every
/// cell, and the returned probabilities always sum to 1. The two
/// normalisations agree whenever every occupied cell is labeled, as after
/// label completion. Returns `None` when the denominator is zero, meaning
/// no class can be assigned.
pub fn class_probabilities(
    map: &ProbabilisticMap,
    cell_labels: &[u32],
    input: &[f64],
) -> Result<Option<Vec<ClassScore>>> {
    CartographerError::check_dim(map.range(), cell_labels.len())?;
    CartographerError::check_dim(map.grid().dim(), input.len())?;

    let densities = map.relative_densities(input);
    let mut mass: BTreeMap<u32, f64> = BTreeMap::new();
    let mut total = 0.0;
    for ((&label, &card), density) in cell_labels.iter().zip(map.cardinality()).zip(densities) {
        if label == 0 {
            continue;
        }
        let w = card as f64 * density;
        *mass.entry(label).or_default() += w;
        total += w;
    }

    if !(total > 0.0) {
        return Ok(None);
    }
    Ok(Some(
        mass.into_iter()
            .map(|(label, w)| ClassScore {
                label,
                probability: w / total,
            })
            .collect(),
    ))
}

/// The `n_choices` most probable classes above `min_probability`, most
/// probable first; equal probabilities rank the lower label first.
pub fn top_k(scores: &[ClassScore], n_choices: usize, min_probability: f64) -> Vec<ClassScore> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
            .then(a.label.cmp(&b.label))
    });
    sorted
        .into_iter()
        .take_while(|s| s.probability > min_probability)
        .take(n_choices)
        .collect()
}

/// Ranks samples against a labeled map.
#[derive(Debug, Clone)]
pub struct Classifier<'a> {
    map: &'a ProbabilisticMap,
    cell_labels: &'a [u32],
    config: ClassifyConfig,
}

impl<'a> Classifier<'a> {
    /// Creates a classifier over `map` whose cells carry `cell_labels`.
    pub fn new(map: &'a ProbabilisticMap, cell_labels: &'a [u32], config: ClassifyConfig) -> Result<Self> {
        config.validate()?;
        CartographerError::check_dim(map.range(), cell_labels.len())?;
        Ok(Self {
            map,
            cell_labels,
            config,
        })
    }

    /// Ranked classes for one sample; `None` when no class can be assigned.
    pub fn rank(&self, input: &[f64]) -> Result<Option<Vec<ClassScore>>> {
        Ok(class_probabilities(self.map, self.cell_labels, input)?
            .map(|scores| top_k(&scores, self.config.n_choices, self.config.min_probability)))
    }

    /// Ranked classes for every sample of `data`, in parallel.
    pub fn rank_all(&self, data: &Dataset) -> Result<Vec<Option<Vec<ClassScore>>>> {
        data.samples().par_iter().map(|x| self.rank(x)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Vector;
    use crate::som::Grid;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn line_map(cards: Vec<usize>) -> ProbabilisticMap {
        let n = cards.len();
        let cells = (0..n).map(|i| Vector::from_vec(vec![i as f64])).collect();
        let grid = Grid::from_cells(&[n], &[0.0], &[n as f64], cells).unwrap();
        ProbabilisticMap::from_parts(grid, vec![1.0; n], cards).unwrap()
    }

    fn score(label: u32, probability: f64) -> ClassScore {
        ClassScore { label, probability }
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            let cards: Vec<usize> = (0..6).map(|_| rng.gen_range(0..5)).collect();
            let labels: Vec<u32> = (0..6).map(|_| rng.gen_range(0..4)).collect();
            let map = line_map(cards);
            let x = [rng.gen_range(-1.0..7.0)];
            if let Some(scores) = class_probabilities(&map, &labels, &x).unwrap() {
                let sum: f64 = scores.iter().map(|s| s.probability).sum();
                assert!((sum - 1.0).abs() < 1e-9);
                assert!(scores.iter().all(|s| s.label != 0 && s.probability >= 0.0));
            }
        }
    }

    #[test]
    fn test_unlabeled_cells_excluded() {
        let map = line_map(vec![1, 1]);
        let scores = class_probabilities(&map, &[0, 4], &[0.0]).unwrap().unwrap();
        assert_eq!(scores, vec![score(4, 1.0)]);
    }

    #[test]
    fn test_no_assignment() {
        let map = line_map(vec![0, 0]);
        assert!(class_probabilities(&map, &[1, 2], &[0.0]).unwrap().is_none());
        let map = line_map(vec![3, 3]);
        assert!(class_probabilities(&map, &[0, 0], &[0.0]).unwrap().is_none());
    }

    #[test]
    fn test_dimension_checked() {
        let map = line_map(vec![1, 1]);
        assert!(class_probabilities(&map, &[1], &[0.0]).is_err());
        assert!(class_probabilities(&map, &[1, 2], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_top_k_order_and_bounds() {
        let scores = [score(1, 0.2), score(2, 0.4), score(3, 0.2), score(4, 0.15), score(5, 0.05)];
        let top = top_k(&scores, 3, 0.1);
        assert_eq!(top, vec![score(2, 0.4), score(1, 0.2), score(3, 0.2)]);

        let top = top_k(&scores, 10, 0.1);
        assert_eq!(top.len(), 4);
        assert!(top.iter().all(|s| s.probability > 0.1));

        assert!(top_k(&scores, 0, 0.0).is_empty());
        assert!(top_k(&scores, 5, 0.4).is_empty());
    }

    #[test]
    fn test_classifier_ranks_dataset() {
        let map = line_map(vec![2, 2]);
        let classifier = Classifier::new(&map, &[1, 2], ClassifyConfig::default()).unwrap();
        let data = Dataset::from_rows(vec![vec![0.0], vec![1.0]]).unwrap();
        let ranked = classifier.rank_all(&data).unwrap();
        assert_eq!(ranked[0].as_ref().unwrap()[0].label, 1);
        assert_eq!(ranked[1].as_ref().unwrap()[0].label, 2);
        assert!(Classifier::new(&map, &[1], ClassifyConfig::default()).is_err());
    }
}
