//! Cell labeling by majority vote of the samples each cell wins.

use crate::error::{CartographerError, Result};
use std::collections::BTreeMap;

/// Label of every cell: the most frequent known label among the samples it
/// wins. Ties go to the lowest label; cells with no labeled sample get 0.
///
/// `winners[s]` is the cell won by sample `s`, `labels[s]` its known label.
pub fn majority_vote(winners: &[usize], labels: &[u32], range: usize) -> Result<Vec<u32>> {
    CartographerError::check_dim(winners.len(), labels.len())?;

    let mut votes: Vec<BTreeMap<u32, usize>> = vec![BTreeMap::new(); range];
    for (&cell, &label) in winners.iter().zip(labels) {
        if cell >= range {
            return Err(CartographerError::IndexOutOfBounds {
                index: cell,
                max: range,
            });
        }
        if label != 0 {
            *votes[cell].entry(label).or_default() += 1;
        }
    }

    Ok(votes
        .iter()
        .map(|tally| {
            // Ascending label order, so strict > keeps the lowest on ties.
            let mut best = (0u32, 0usize);
            for (&label, &count) in tally {
                if count > best.1 {
                    best = (label, count);
                }
            }
            best.0
        })
        .collect())
}
