//! Integration tests for the Cartographer classification engine.

use cartographer::{
    Agglomerator, Annotation, CartographerError, Classifier, ClassifyConfig, Config, Dataset,
    Grid, HacInput, Linkage, Model, Pipeline, PrsomConfig, PrsomTrainer, SomConfig, SomTrainer,
    StopRule, TextFormat,
};
use tempfile::tempdir;

/// Twelve 2-D points in two tight groups centred on (0,0) and (10,10).
fn create_two_clusters() -> Dataset {
    let offsets = [
        (0.5, 0.0),
        (-0.5, 0.0),
        (0.0, 0.5),
        (0.0, -0.5),
        (0.3, 0.3),
        (-0.3, -0.3),
    ];
    let mut rows = Vec::new();
    for centre in [0.0, 10.0] {
        for (dx, dy) in offsets {
            rows.push(vec![centre + dx, centre + dy]);
        }
    }
    Dataset::from_rows(rows).unwrap()
}

fn scenario_config() -> SomConfig {
    SomConfig {
        sizes: vec![1, 2],
        min: vec![0.0],
        max: vec![10.0],
        learning_rate_max: 0.5,
        learning_rate_min: 0.01,
        smooth_distance_max: 1.0,
        smooth_distance_min: 0.1,
        threshold_neighborhood: 0.1,
        cycles: 50,
        ..SomConfig::default()
    }
}

#[test]
fn test_end_to_end_training() {
    let mut data = create_two_clusters();
    let config = scenario_config();
    let mut grid = Grid::from_config(&config, data.dim()).unwrap();
    let mut trainer = SomTrainer::new(config).unwrap();

    let report = trainer.train(&mut grid, &mut data, None).unwrap();

    assert!(report.cycles_run <= 50);
    let near = |cell: usize, target: [f64; 2]| grid.cell(cell).distance(&target);
    let (a, b) = if near(0, [0.0, 0.0]) < near(1, [0.0, 0.0]) { (0, 1) } else { (1, 0) };
    assert!(near(a, [0.0, 0.0]) < 0.5, "neuron {a} at {:?}", grid.cell(a));
    assert!(near(b, [10.0, 10.0]) < 0.5, "neuron {b} at {:?}", grid.cell(b));
    assert!(report.final_stats.contrast.abs() < 1e-9);
    assert!(report.final_stats.best_rms <= report.final_stats.rms);
    assert_eq!(data.occupancy(2), vec![6, 6]);
}

#[test]
fn test_text_files_roundtrip() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("train.dat");
    let grid_path = dir.path().join("map.grid");
    let labels_path = dir.path().join("train.lab");

    let data = create_two_clusters();
    TextFormat::write_dataset(&data_path, &data, false).unwrap();
    let loaded = TextFormat::read_dataset(&data_path).unwrap();
    assert_eq!(loaded.samples(), data.samples());

    let labels: Vec<u32> = (0..12).map(|i| if i == 0 { 1 } else if i == 6 { 2 } else { 0 }).collect();
    TextFormat::write_labels(&labels_path, &labels, false).unwrap();
    assert_eq!(TextFormat::read_labels(&labels_path).unwrap(), labels);

    let grid = Grid::new_linear(&[3, 2], &[0.0], &[10.0], 2).unwrap();
    let annotation = [0.0, 1.0, 0.0, 2.5, 0.0, 0.0];
    TextFormat::write_grid(&grid_path, &grid, Some(Annotation::Dense(&annotation)), false).unwrap();
    let (loaded, values) = TextFormat::read_grid(&grid_path).unwrap();
    assert_eq!(loaded, grid);
    assert_eq!(values.unwrap(), annotation.to_vec());

    // Existing outputs are protected unless overwrite is requested.
    assert!(matches!(
        TextFormat::write_grid(&grid_path, &grid, None, false),
        Err(CartographerError::OutputExists(_))
    ));
    let sparse = Annotation::Sparse {
        values: &annotation,
        threshold: 0.0,
    };
    TextFormat::write_grid(&grid_path, &grid, Some(sparse), true).unwrap();
    let (_, values) = TextFormat::read_grid(&grid_path).unwrap();
    assert_eq!(values.unwrap(), annotation.to_vec());

    assert!(matches!(
        TextFormat::read_dataset(dir.path().join("missing.dat")),
        Err(CartographerError::FileNotFound(_))
    ));
}

#[test]
fn test_prsom_activations() {
    let mut data = create_two_clusters();
    let som = scenario_config();
    let mut grid = Grid::from_config(&som, data.dim()).unwrap();
    SomTrainer::new(som).unwrap().train(&mut grid, &mut data, None).unwrap();

    let prsom = PrsomTrainer::new(PrsomConfig {
        variance_cycles: 5,
        mean_cycles: 5,
        min_probability: 0.0,
        ..PrsomConfig::default()
    })
    .unwrap();
    let mut map = prsom.init_map(grid).unwrap();
    let report = prsom.train(&mut map, &mut data).unwrap();

    assert_eq!(report.history.len(), 11);
    assert_eq!(map.cardinality(), &[6, 6]);
    for row in prsom.export_activations(&map, &data) {
        let sum: f64 = row.iter().map(|(_, a)| a).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    let dir = tempdir().unwrap();
    let path = dir.path().join("act.txt");
    let rows = prsom.export_activations(&map, &data);
    TextFormat::write_activations(&path, &rows, map.range(), false).unwrap();
    let (back, range) = TextFormat::read_activations(&path).unwrap();
    assert_eq!(range, 2);
    assert_eq!(back.len(), 12);
}

#[test]
fn test_pipeline_with_partial_labels() {
    let mut data = create_two_clusters();
    let labels = (0..12).map(|i| if i == 0 { 1 } else if i == 6 { 2 } else { 0 }).collect();
    data.set_labels(labels).unwrap();

    let mut config = Config::default();
    config.som = scenario_config();
    config.prsom.variance_cycles = 5;
    config.prsom.mean_cycles = 5;
    config.hac.linkage = Linkage::ScaledWard;
    config.hac.label_completion = true;

    let output = Pipeline::run(&config, &mut data, None).unwrap();
    let mut cell_labels = output.model.cell_labels.clone();
    cell_labels.sort_unstable();
    assert_eq!(cell_labels, vec![1, 2]);

    for (i, ranking) in output.rankings.iter().enumerate() {
        let expected = if i < 6 { 1 } else { 2 };
        assert_eq!(ranking.as_ref().unwrap()[0].label, expected);
    }

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.bin");
    output.model.save(&path, false).unwrap();
    let model = Model::load(&path).unwrap();
    assert_eq!(model, output.model);

    let fresh = Dataset::from_rows(vec![vec![0.2, -0.1], vec![9.7, 10.4]]).unwrap();
    let classifier = Classifier::new(&model.map, &model.cell_labels, ClassifyConfig::default()).unwrap();
    let ranked = classifier.rank_all(&fresh).unwrap();
    assert_eq!(ranked[0].as_ref().unwrap()[0].label, 1);
    assert_eq!(ranked[1].as_ref().unwrap()[0].label, 2);
}

#[test]
fn test_pipeline_with_test_set() {
    let mut train = create_two_clusters();
    let mut test = Dataset::from_rows(vec![vec![0.1, 0.1], vec![10.1, 9.9], vec![-0.2, 0.3]]).unwrap();

    let mut config = Config::default();
    config.som = scenario_config();
    config.prsom.enabled = false;
    config.hac.target_clusters = 2;

    let output = Pipeline::run(&config, &mut train, Some(&mut test)).unwrap();
    assert_eq!(output.rankings.len(), 3);
    assert_eq!(output.clustering.cluster_count, 2);
    let first = output.rankings[0].as_ref().unwrap()[0].label;
    let second = output.rankings[1].as_ref().unwrap()[0].label;
    let third = output.rankings[2].as_ref().unwrap()[0].label;
    assert_ne!(first, second);
    assert_eq!(first, third);
}

#[test]
fn test_cluster_samples_directly() {
    let data = create_two_clusters();
    let labels: Vec<u32> = (0..12).map(|i| if i == 3 { 7 } else if i == 9 { 8 } else { 0 }).collect();
    let data = data.with_labels(labels).unwrap();
    let input = HacInput::from_dataset(&data).unwrap();

    for linkage in Linkage::ALL {
        let input = input.clone().with_sigma(vec![1.0; 12]).unwrap();
        let result = Agglomerator::new(linkage, StopRule::LabelCompletion)
            .fit(&input)
            .unwrap();
        let expected: Vec<u32> = (0..12).map(|i| if i < 6 { 7 } else { 8 }).collect();
        assert_eq!(result.labels, expected, "{linkage}");
    }

    let result = Agglomerator::new(Linkage::Ward, StopRule::ClusterCount(2))
        .fit(&HacInput::from_dataset(&create_two_clusters()).unwrap())
        .unwrap();
    assert_eq!(result.cluster_count, 2);
    assert_eq!(result.merges.len(), 10);
    assert!(result.clusters[..6].iter().all(|&c| c == Some(1)));
    assert!(result.clusters[6..].iter().all(|&c| c == Some(2)));
}
