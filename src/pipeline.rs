//! End-to-end training: SOM, PRSOM, cell labeling, clustering and ranking.

use crate::classify::{majority_vote, ClassScore, Classifier};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::hac::{Agglomeration, Agglomerator, HacInput, StopRule};
use crate::prsom::{PrsomReport, PrsomTrainer, ProbabilisticMap};
use crate::som::{CycleStats, Grid, SomTrainer, TrainingReport};
use crate::storage::{Model, SparseRow};
use log::info;
use rayon::prelude::*;

/// Everything a pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// SOM training history.
    pub som: TrainingReport,
    /// PRSOM history, when enabled.
    pub prsom: Option<PrsomReport>,
    /// Labels voted onto cells by the training samples (0 = none).
    pub voted_labels: Vec<u32>,
    /// Clustering of the cells.
    pub clustering: Agglomeration,
    /// Trained map with final cell labels.
    pub model: Model,
    /// Ranked classes per sample of the evaluation set (the test set when
    /// given, else the training set).
    pub rankings: Vec<Option<Vec<ClassScore>>>,
    /// Sparse activations of every training sample.
    pub activations: Vec<SparseRow>,
}

/// Runs the full training chain.
pub struct Pipeline;

impl Pipeline {
    /// Trains on `train`, optionally monitoring and ranking `test`.
    ///
    /// Cells are clustered with the configured stop rule. After label
    /// completion every active cell carries a known label. After a cluster
    /// count stop, a cluster keeps its known label if it has one; clusters
    /// without one get fresh classes numbered after the largest known label
    /// (plain cluster ids when the training set is unlabeled).
    pub fn run(config: &Config, train: &mut Dataset, test: Option<&mut Dataset>) -> Result<PipelineOutput> {
        Self::run_with_progress(config, train, test, |_| {})
    }

    /// Like [`Pipeline::run`], reporting every SOM cycle to `progress`.
    pub fn run_with_progress<F>(
        config: &Config,
        train: &mut Dataset,
        test: Option<&mut Dataset>,
        progress: F,
    ) -> Result<PipelineOutput>
    where
        F: FnMut(&CycleStats),
    {
        config.validate()?;
        let mut test = test;

        let mut grid = Grid::from_config(&config.som, train.dim())?;
        let som = SomTrainer::new(config.som.clone())?.train_with_progress(
            &mut grid,
            train,
            test.as_deref_mut(),
            progress,
        )?;

        let (map, prsom) = if config.prsom.enabled {
            let prsom_trainer = PrsomTrainer::new(config.prsom.clone())?;
            let mut map = prsom_trainer.init_map(grid)?;
            let report = prsom_trainer.train(&mut map, train)?;
            (map, Some(report))
        } else {
            let mut map = ProbabilisticMap::new(grid, config.prsom.initial_sigma)?;
            map.set_cardinality(train.occupancy(map.range()));
            (map, None)
        };

        let voted_labels = majority_vote(&train.winners(), train.labels(), map.range())?;
        let stop = config.hac.stop_rule();
        info!(
            "{} of {} cells labeled by vote; clustering with {:?}",
            voted_labels.iter().filter(|&&l| l != 0).count(),
            map.range(),
            stop
        );

        let input = HacInput::from_map(&map)?.with_labels(voted_labels.clone())?;
        let clustering = Agglomerator::new(config.hac.linkage, stop).fit(&input)?;
        let cell_labels = match stop {
            StopRule::LabelCompletion => clustering.labels.clone(),
            StopRule::ClusterCount(_) => class_per_cluster(&clustering),
        };

        let activations: Vec<SparseRow> = train
            .samples()
            .par_iter()
            .map(|x| map.sparse_activations(x, config.prsom.min_probability))
            .collect();
        let model = Model::new(map, cell_labels, Some(config.hac.linkage))?;

        let classifier = Classifier::new(&model.map, &model.cell_labels, config.classify.clone())?;
        let rankings = match test.as_deref() {
            Some(test) => classifier.rank_all(test)?,
            None => classifier.rank_all(train)?,
        };
        let unassigned = rankings.iter().filter(|r| r.is_none()).count();
        info!(
            "Pipeline finished: {} classes, {} samples ranked, {} without assignment",
            model.class_count(),
            rankings.len(),
            unassigned
        );

        Ok(PipelineOutput {
            som,
            prsom,
            voted_labels,
            clustering,
            model,
            rankings,
            activations,
        })
    }
}

/// Known label of each cell's cluster, or a fresh class for clusters
/// without one.
fn class_per_cluster(clustering: &Agglomeration) -> Vec<u32> {
    let known = clustering.cluster_labels();
    let offset = known.iter().copied().max().unwrap_or(0);
    clustering
        .clusters
        .iter()
        .map(|cluster| match cluster {
            Some(id) if known[id - 1] != 0 => known[id - 1],
            Some(id) => offset + *id as u32,
            None => 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SomConfig;

    fn blobs() -> Dataset {
        let mut rows = Vec::new();
        for i in 0..6 {
            let e = i as f64 * 0.1;
            rows.push(vec![1.0 + e, 1.0 - e]);
            rows.push(vec![8.0 - e, 8.0 + e]);
        }
        Dataset::from_rows(rows).unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.som = SomConfig {
            sizes: vec![2, 2],
            min: vec![0.0],
            max: vec![10.0],
            cycles: 20,
            smooth_distance_max: 1.0,
            smooth_distance_min: 0.1,
            seed: Some(5),
            ..SomConfig::default()
        };
        config.prsom.variance_cycles = 3;
        config.prsom.mean_cycles = 3;
        config
    }

    #[test]
    fn test_unsupervised_run() {
        let mut data = blobs();
        let output = Pipeline::run(&config(), &mut data, None).unwrap();

        assert_eq!(output.rankings.len(), data.len());
        assert_eq!(output.activations.len(), data.len());
        assert!(output.voted_labels.iter().all(|&l| l == 0));
        assert!(output.clustering.cluster_count <= 2);
        assert!(output.model.class_count() >= 1);
        assert!(output.prsom.is_some());
    }

    #[test]
    fn test_supervised_run_labels_every_active_cell() {
        let mut data = blobs();
        let labels = (0..data.len()).map(|i| if i % 2 == 0 { 1 } else { 2 }).collect();
        data.set_labels(labels).unwrap();

        let mut config = config();
        config.prsom.enabled = false;
        config.hac.label_completion = true;
        let output = Pipeline::run(&config, &mut data, None).unwrap();

        let cards = output.model.map.cardinality();
        for (cell, &label) in output.model.cell_labels.iter().enumerate() {
            if cards[cell] > 0 {
                assert_ne!(label, 0);
            }
        }
        let top = output.rankings[0].as_ref().unwrap();
        assert_eq!(top[0].label, 1);
        let top = output.rankings[1].as_ref().unwrap();
        assert_eq!(top[0].label, 2);
    }

    #[test]
    fn test_labeled_run_honours_cluster_count() {
        let mut data = blobs();
        let labels = (0..data.len()).map(|i| if i % 2 == 0 { 1 } else { 2 }).collect();
        data.set_labels(labels).unwrap();

        let mut config = config();
        config.hac.label_completion = false;
        config.hac.target_clusters = 2;
        let output = Pipeline::run(&config, &mut data, None).unwrap();

        assert_eq!(output.clustering.cluster_count, 2);
        assert_eq!(output.model.class_count(), 2);
        assert_eq!(output.rankings[0].as_ref().unwrap()[0].label, 1);
        assert_eq!(output.rankings[1].as_ref().unwrap()[0].label, 2);
    }

    #[test]
    fn test_unlabeled_clusters_get_fresh_classes() {
        let mut data = blobs();
        let labels = (0..data.len()).map(|i| if i == 0 { 4 } else { 0 }).collect();
        data.set_labels(labels).unwrap();

        let mut config = config();
        config.hac.target_clusters = 2;
        let output = Pipeline::run(&config, &mut data, None).unwrap();

        assert_eq!(output.clustering.cluster_count, 2);
        assert_eq!(output.rankings[0].as_ref().unwrap()[0].label, 4);
        let fresh = output.rankings[1].as_ref().unwrap()[0].label;
        assert!(fresh == 5 || fresh == 6, "fresh class {fresh}");
    }

    #[test]
    fn test_disabled_prsom_section_is_not_validated() {
        let mut config = config();
        config.prsom.enabled = false;
        config.prsom.smooth_distance = 0.0;
        config.prsom.smooth_distance_max = 0.1;
        config.prsom.smooth_distance_min = 0.5;
        let output = Pipeline::run(&config, &mut blobs(), None).unwrap();
        assert!(output.prsom.is_none());
        assert_eq!(output.activations.len(), 12);
    }

    #[test]
    fn test_label_completion_needs_labels() {
        let mut config = config();
        config.hac.label_completion = true;
        assert!(matches!(
            Pipeline::run(&config, &mut blobs(), None),
            Err(crate::error::CartographerError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.som.cycles = 0;
        assert!(Pipeline::run(&config, &mut blobs(), None).is_err());
    }
}
