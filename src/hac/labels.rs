//! Walks over the merge forest: label back-propagation and cluster ids.

use super::engine::Merge;
use crate::error::{CartographerError, Result};

/// Parent of every object in the merge forest; roots have none.
fn parents(n: usize, merges: &[Merge]) -> Result<Vec<Option<usize>>> {
    let mut parent = vec![None; n];
    for m in merges {
        if m.from >= n || m.into >= n {
            return Err(CartographerError::IndexOutOfBounds {
                index: m.from.max(m.into),
                max: n,
            });
        }
        if parent[m.from].is_some() {
            return Err(CartographerError::Inconsistent(format!(
                "object {} absorbed twice",
                m.from
            )));
        }
        parent[m.from] = Some(m.into);
    }
    Ok(parent)
}

/// Follows parents from `start` until `stop` holds or a root is reached.
/// A walk longer than the forest has objects means a cycle.
fn climb(parent: &[Option<usize>], start: usize, stop: impl Fn(usize) -> bool) -> Result<usize> {
    let mut node = start;
    for _ in 0..=parent.len() {
        if stop(node) {
            return Ok(node);
        }
        match parent[node] {
            Some(p) => node = p,
            None => return Ok(node),
        }
    }
    Err(CartographerError::Inconsistent(format!(
        "cycle in merge history above object {start}"
    )))
}

/// Gives every unlabeled object the label of its nearest labeled ancestor.
///
/// `labels` are the labels held at the end of the run. With `require_all`,
/// an active object that stays unlabeled is an inconsistency.
pub(crate) fn propagate(
    merges: &[Merge],
    labels: &[u32],
    members: &[usize],
    require_all: bool,
) -> Result<Vec<u32>> {
    let parent = parents(labels.len(), merges)?;
    let mut out = labels.to_vec();
    for i in 0..labels.len() {
        if members[i] == 0 || labels[i] != 0 {
            continue;
        }
        let found = climb(&parent, i, |node| labels[node] != 0)?;
        out[i] = labels[found];
        if require_all && out[i] == 0 {
            return Err(CartographerError::Inconsistent(format!(
                "object {i} left unlabeled after label completion"
            )));
        }
    }
    Ok(out)
}

/// 1-based cluster id per object, numbered by root index, and the number of
/// clusters. Objects with no members get `None`.
pub(crate) fn assign_clusters(
    merges: &[Merge],
    members: &[usize],
) -> Result<(Vec<Option<usize>>, usize)> {
    let n = members.len();
    let parent = parents(n, merges)?;

    let mut root_id = vec![0usize; n];
    let mut count = 0;
    for i in 0..n {
        if members[i] > 0 && parent[i].is_none() {
            count += 1;
            root_id[i] = count;
        }
    }

    let mut clusters = vec![None; n];
    for i in 0..n {
        if members[i] == 0 {
            continue;
        }
        let root = climb(&parent, i, |_| false)?;
        if root_id[root] == 0 {
            return Err(CartographerError::Inconsistent(format!(
                "object {i} merged into excluded object {root}"
            )));
        }
        clusters[i] = Some(root_id[root]);
    }
    Ok((clusters, count))
}
