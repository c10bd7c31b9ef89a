//! Label-constrained agglomerative clustering with a nearest-neighbour cache.

use super::criterion::Linkage;
use super::labels;
use crate::dataset::Dataset;
use crate::error::{CartographerError, Result};
use crate::linalg::{squared_distance, SymmetricMatrix, Vector};
use crate::prsom::ProbabilisticMap;
use crate::som::Grid;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// When to stop merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopRule {
    /// Stop once this many active clusters remain.
    ClusterCount(usize),
    /// Stop once no active cluster is unlabeled.
    LabelCompletion,
}

/// Objects to cluster.
///
/// Objects with a member count of 0 are excluded from the start: they never
/// merge and receive no cluster.
#[derive(Debug, Clone)]
pub struct HacInput {
    features: Vec<Vector>,
    members: Vec<usize>,
    labels: Vec<u32>,
    sigma: Option<Vec<f64>>,
}

impl HacInput {
    /// Unlabeled objects with one member each.
    pub fn new(features: Vec<Vector>) -> Result<Self> {
        let dim = features
            .first()
            .map(Vector::dim)
            .ok_or_else(|| CartographerError::EmptyInput("no objects to cluster".to_string()))?;
        for f in &features {
            CartographerError::check_dim(dim, f.dim())?;
        }
        let n = features.len();
        Ok(Self {
            features,
            members: vec![1; n],
            labels: vec![0; n],
            sigma: None,
        })
    }

    /// Replaces the member counts.
    pub fn with_members(mut self, members: Vec<usize>) -> Result<Self> {
        CartographerError::check_dim(self.len(), members.len())?;
        self.members = members;
        Ok(self)
    }

    /// Replaces the known labels (0 = unknown).
    pub fn with_labels(mut self, labels: Vec<u32>) -> Result<Self> {
        CartographerError::check_dim(self.len(), labels.len())?;
        self.labels = labels;
        Ok(self)
    }

    /// Attaches per-object variances, required by [`Linkage::ScaledWard`].
    pub fn with_sigma(mut self, sigma: Vec<f64>) -> Result<Self> {
        CartographerError::check_dim(self.len(), sigma.len())?;
        if let Some(bad) = sigma.iter().find(|s| !(**s > 0.0)) {
            return Err(CartographerError::Config(format!("non-positive sigma {bad}")));
        }
        self.sigma = Some(sigma);
        Ok(self)
    }

    /// Every sample of `data` as its own object, with the dataset's labels.
    pub fn from_dataset(data: &Dataset) -> Result<Self> {
        Self::new(data.samples().to_vec())?.with_labels(data.labels().to_vec())
    }

    /// Grid neurons weighted by how many samples each one won.
    pub fn from_grid(grid: &Grid, occupancy: Vec<usize>) -> Result<Self> {
        Self::new(grid.cells().to_vec())?.with_members(occupancy)
    }

    /// PRSOM neurons weighted by cardinality, carrying their variances.
    pub fn from_map(map: &ProbabilisticMap) -> Result<Self> {
        Self::from_grid(map.grid(), map.cardinality().to_vec())?.with_sigma(map.sigma().to_vec())
    }

    /// Number of objects, including excluded ones.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Always false: an empty input cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Member counts.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Known labels.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }
}

/// One dendrogram step: `from` was absorbed into `into` at dissimilarity
/// `value`, yielding a cluster of `size` members.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    /// Surviving object (the lower index).
    pub into: usize,
    /// Deactivated object (the higher index).
    pub from: usize,
    /// Dissimilarity at which they merged.
    pub value: f64,
    /// Member count of the merged cluster.
    pub size: usize,
}

/// Outcome of a clustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agglomeration {
    /// Merges in the order they happened.
    pub merges: Vec<Merge>,
    /// Cluster id per object, 1-based in order of the surviving object's
    /// index; `None` for excluded objects.
    pub clusters: Vec<Option<usize>>,
    /// Number of clusters.
    pub cluster_count: usize,
    /// Final label per object after back-propagation (0 = still unknown).
    pub labels: Vec<u32>,
    /// Member count per object at the end; non-zero only for survivors.
    pub members: Vec<usize>,
}

impl Agglomeration {
    /// Label of every cluster, indexed by `cluster id - 1`.
    pub fn cluster_labels(&self) -> Vec<u32> {
        let mut out = vec![0; self.cluster_count];
        for (cluster, &label) in self.clusters.iter().zip(&self.labels) {
            if let Some(id) = cluster {
                if out[id - 1] == 0 {
                    out[id - 1] = label;
                }
            }
        }
        out
    }
}

/// Mutable state of one run.
struct ClusterState {
    dissim: SymmetricMatrix,
    members: Vec<usize>,
    active: Vec<bool>,
    labels: Vec<u32>,
    /// Nearest eligible active neighbour of each active object.
    nearest: Vec<Option<(usize, f64)>>,
}

impl ClusterState {
    #[inline]
    fn eligible(&self, i: usize, j: usize) -> bool {
        let (a, b) = (self.labels[i], self.labels[j]);
        a == 0 || b == 0 || a == b
    }

    /// Nearest eligible active neighbour of `i`, lowest index on ties.
    fn scan(&self, i: usize) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for j in 0..self.active.len() {
            if j == i || !self.active[j] || !self.eligible(i, j) {
                continue;
            }
            let d = self.dissim.get(i, j);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((j, d));
            }
        }
        best
    }

    /// Rescans the given objects in parallel.
    fn refresh(&mut self, objects: &[usize]) {
        let found: Vec<Option<(usize, f64)>> = objects.par_iter().map(|&i| self.scan(i)).collect();
        for (&i, nn) in objects.iter().zip(found) {
            self.nearest[i] = nn;
        }
    }

    fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    fn unlabeled_active(&self) -> usize {
        self.active
            .iter()
            .zip(&self.labels)
            .filter(|&(&a, &l)| a && l == 0)
            .count()
    }

    /// Globally closest eligible pair, lowest first index on ties.
    fn closest_pair(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (i, nn) in self.nearest.iter().enumerate() {
            if !self.active[i] {
                continue;
            }
            if let Some((j, d)) = *nn {
                if best.map_or(true, |(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }
        best
    }
}

/// Agglomerative hierarchical clustering.
#[derive(Debug, Clone, Copy)]
pub struct Agglomerator {
    linkage: Linkage,
    stop: StopRule,
}

impl Agglomerator {
    /// Creates a clusterer.
    pub fn new(linkage: Linkage, stop: StopRule) -> Self {
        Self { linkage, stop }
    }

    /// The linkage criterion.
    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// The stop rule.
    pub fn stop_rule(&self) -> StopRule {
        self.stop
    }

    /// Clusters `input` until the stop rule is met.
    ///
    /// Returns [`CartographerError::Inconsistent`] if the cluster state is
    /// found corrupted, for instance an object left unlabeled after a label
    /// completion run. Such a state cannot be repaired.
    pub fn fit(&self, input: &HacInput) -> Result<Agglomeration> {
        if let StopRule::ClusterCount(0) = self.stop {
            return Err(CartographerError::Config(
                "target cluster count must be positive".to_string(),
            ));
        }
        let sigma = match (&input.sigma, self.linkage.needs_sigma()) {
            (Some(s), _) => s.clone(),
            (None, false) => vec![1.0; input.len()],
            (None, true) => {
                return Err(CartographerError::Config(format!(
                    "linkage {} needs per-object variances",
                    self.linkage
                )))
            }
        };

        let mut state = self.initial_state(input, &sigma);
        let active = state.active_count();
        if active == 0 {
            return Err(CartographerError::EmptyInput(
                "every object has a member count of 0".to_string(),
            ));
        }
        if self.stop == StopRule::LabelCompletion
            && state.unlabeled_active() > 0
            && state.unlabeled_active() == active
        {
            return Err(CartographerError::Config(
                "label completion needs at least one labeled object".to_string(),
            ));
        }
        info!(
            "Clustering {} objects ({} active) with {} linkage, stop at {:?}",
            input.len(),
            active,
            self.linkage,
            self.stop
        );

        let candidates: Vec<usize> = (0..input.len()).filter(|&i| state.active[i]).collect();
        state.refresh(&candidates);

        let mut merges = Vec::with_capacity(active.saturating_sub(1));
        while !self.satisfied(&state) {
            let Some((a, b, value)) = state.closest_pair() else {
                warn!(
                    "No eligible pair left with {} clusters active; stopping early",
                    state.active_count()
                );
                break;
            };
            let merge = self.merge(&mut state, a, b, value)?;
            debug!(
                "Merged {} into {} at {:.6} (size {})",
                merge.from, merge.into, merge.value, merge.size
            );
            merges.push(merge);
        }

        let require_labels = self.stop == StopRule::LabelCompletion;
        let final_labels = labels::propagate(&merges, &state.labels, &input.members, require_labels)?;
        let (clusters, cluster_count) = labels::assign_clusters(&merges, &input.members)?;
        info!("Clustering finished with {} clusters after {} merges", cluster_count, merges.len());

        Ok(Agglomeration {
            merges,
            clusters,
            cluster_count,
            labels: final_labels,
            members: state.members,
        })
    }

    fn initial_state(&self, input: &HacInput, sigma: &[f64]) -> ClusterState {
        let n = input.len();
        let active: Vec<bool> = input.members.iter().map(|&m| m > 0).collect();
        let mut dissim = SymmetricMatrix::zeros(n);
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                let sq = squared_distance(&input.features[i], &input.features[j]);
                let value = self.linkage.initial(
                    sq,
                    input.members[i] as f64,
                    input.members[j] as f64,
                    sigma[i],
                    sigma[j],
                );
                dissim.set(i, j, value);
            }
        }
        ClusterState {
            dissim,
            members: input.members.clone(),
            active,
            labels: input.labels.clone(),
            nearest: vec![None; n],
        }
    }

    fn satisfied(&self, state: &ClusterState) -> bool {
        match self.stop {
            StopRule::ClusterCount(k) => state.active_count() <= k,
            StopRule::LabelCompletion => state.unlabeled_active() == 0,
        }
    }

    fn merge(&self, state: &mut ClusterState, a: usize, b: usize, value: f64) -> Result<Merge> {
        let (into, from) = (a.min(b), a.max(b));
        if into == from || !state.active[into] || !state.active[from] {
            return Err(CartographerError::Inconsistent(format!(
                "nearest-neighbour cache points at inactive pair ({into}, {from})"
            )));
        }
        if !state.eligible(into, from) {
            return Err(CartographerError::Inconsistent(format!(
                "objects {into} and {from} carry different labels ({} and {})",
                state.labels[into], state.labels[from]
            )));
        }

        let d_ij = state.dissim.get(into, from);
        let (m_i, m_j) = (state.members[into] as f64, state.members[from] as f64);
        for k in 0..state.active.len() {
            if !state.active[k] || k == into || k == from {
                continue;
            }
            let updated = self.linkage.update(
                state.dissim.get(into, k),
                state.dissim.get(from, k),
                d_ij,
                m_i,
                m_j,
                state.members[k] as f64,
            );
            state.dissim.set(into, k, updated);
        }

        state.active[from] = false;
        state.members[into] += state.members[from];
        state.members[from] = 0;
        if state.labels[into] == 0 {
            state.labels[into] = state.labels[from];
        }
        state.nearest[from] = None;

        let mut rescan = vec![into];
        for k in 0..state.active.len() {
            if !state.active[k] || k == into {
                continue;
            }
            match state.nearest[k] {
                Some((nn, _)) if nn == into || nn == from => rescan.push(k),
                current => {
                    if !state.eligible(k, into) {
                        continue;
                    }
                    let d = state.dissim.get(k, into);
                    let closer = match current {
                        None => true,
                        Some((nn, bd)) => d < bd || (d == bd && into < nn),
                    };
                    if closer {
                        state.nearest[k] = Some((into, d));
                    }
                }
            }
        }
        state.refresh(&rescan);

        Ok(Merge {
            into,
            from,
            value,
            size: state.members[into],
        })
    }
}
