//! Cartographer CLI - SOM / PRSOM / HAC classification engine
//!
//! Command-line interface for training maps, clustering and classifying.

use cartographer::{
    Agglomerator, Annealing, Annotation, CartographerError, Classifier, ClassifyConfig, Config,
    Dataset, GridInit, HacInput, Linkage, Model, Pipeline, PrsomTrainer, Result, StopRule,
    TextFormat,
};
use clap::{Parser, Subcommand};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::error;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "cartographer")]
#[command(author = "Cartographer Contributors")]
#[command(version)]
#[command(about = "SOM / PRSOM / HAC classification engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Overwrite existing output files
    #[arg(short, long, global = true)]
    force: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a map, label or cluster its cells and save the model
    Train {
        /// Training dataset
        #[arg(short, long)]
        input: PathBuf,

        /// Known labels of the training samples (0 = unknown)
        #[arg(short, long)]
        labels: Option<PathBuf>,

        /// Test dataset used for monitoring and ranking
        #[arg(short, long)]
        test: Option<PathBuf>,

        /// Output model snapshot
        #[arg(short, long)]
        output: PathBuf,

        /// Also write the grid, annotated with cell labels
        #[arg(long)]
        grid_out: Option<PathBuf>,

        /// Also write sparse activations of the training samples
        #[arg(long)]
        activations: Option<PathBuf>,

        /// Grid axis sizes, comma separated
        #[arg(long, value_delimiter = ',', default_value = "10,10")]
        sizes: Vec<usize>,

        /// Lower initialisation bound (one value or one per component)
        #[arg(long, value_delimiter = ',', default_value = "0")]
        min: Vec<f64>,

        /// Upper initialisation bound (one value or one per component)
        #[arg(long, value_delimiter = ',', default_value = "1")]
        max: Vec<f64>,

        /// Number of training cycles
        #[arg(short = 'n', long, default_value = "50")]
        cycles: usize,

        /// Learning rate at the start
        #[arg(long, default_value = "0.5")]
        learning_rate_max: f64,

        /// Learning rate at the end
        #[arg(long, default_value = "0.01")]
        learning_rate_min: f64,

        /// Neighborhood radius at the start
        #[arg(long, default_value = "5.0")]
        smooth_max: f64,

        /// Neighborhood radius at the end
        #[arg(long, default_value = "0.5")]
        smooth_min: f64,

        /// Neighbors with a smaller kernel value are not updated
        #[arg(long, default_value = "0.1")]
        threshold: f64,

        /// Anneal once per presented sample instead of once per cycle
        #[arg(long)]
        stochastic: bool,

        /// Find all winners of a cycle before updating
        #[arg(long)]
        batch: bool,

        /// Shuffle samples every cycle
        #[arg(long)]
        shuffle: bool,

        /// Random instead of linear grid initialisation
        #[arg(long)]
        random_init: bool,

        /// Random seed for reproducibility
        #[arg(short, long)]
        seed: Option<u64>,

        /// Skip the PRSOM refinement
        #[arg(long)]
        no_prsom: bool,

        /// Linkage criterion (code 1-8 or name)
        #[arg(short = 'c', long, default_value = "ward")]
        linkage: Linkage,

        /// Number of cell clusters
        #[arg(short = 'k', long, default_value = "2")]
        clusters: usize,

        /// Merge cells until every active cell carries a label
        #[arg(long)]
        complete_labels: bool,
    },

    /// Refine a grid file into a probabilistic map
    Prsom {
        /// Grid file produced by `train --grid-out`
        #[arg(short, long)]
        grid: PathBuf,

        /// Training dataset
        #[arg(short, long)]
        input: PathBuf,

        /// Output grid, annotated with per-cell sigma
        #[arg(short, long)]
        output: PathBuf,

        /// Also write sparse activations
        #[arg(long)]
        activations: Option<PathBuf>,

        /// Variance-only cycles
        #[arg(long, default_value = "10")]
        variance_cycles: usize,

        /// Mean and variance cycles
        #[arg(long, default_value = "10")]
        mean_cycles: usize,
    },

    /// Cluster the samples of a dataset directly
    Cluster {
        /// Dataset to cluster
        #[arg(short, long)]
        input: PathBuf,

        /// Known labels (0 = unknown)
        #[arg(short, long)]
        labels: Option<PathBuf>,

        /// Output labels file (cluster ids, or completed labels)
        #[arg(short, long)]
        output: PathBuf,

        /// Linkage criterion (code 1-8 or name)
        #[arg(short = 'c', long, default_value = "ward")]
        linkage: Linkage,

        /// Number of clusters
        #[arg(short = 'k', long, default_value = "2")]
        clusters: usize,

        /// Merge until every sample carries a label
        #[arg(long)]
        complete_labels: bool,
    },

    /// Rank classes for every sample of a dataset
    Classify {
        /// Model snapshot
        #[arg(short, long)]
        model: PathBuf,

        /// Dataset to classify
        #[arg(short, long)]
        input: PathBuf,

        /// Maximum classes per sample
        #[arg(short = 'k', long, default_value = "3")]
        choices: usize,

        /// Minimum reported probability
        #[arg(short = 'p', long, default_value = "0.05")]
        min_probability: f64,
    },

    /// Show model statistics
    Info {
        /// Model snapshot to inspect
        model: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let force = cli.force;
    let result = match cli.command {
        Commands::Train {
            input,
            labels,
            test,
            output,
            grid_out,
            activations,
            sizes,
            min,
            max,
            cycles,
            learning_rate_max,
            learning_rate_min,
            smooth_max,
            smooth_min,
            threshold,
            stochastic,
            batch,
            shuffle,
            random_init,
            seed,
            no_prsom,
            linkage,
            clusters,
            complete_labels,
        } => {
            let mut config = Config::default();
            config.storage.overwrite = force;
            config.som.sizes = sizes;
            config.som.min = min;
            config.som.max = max;
            config.som.cycles = cycles;
            config.som.learning_rate_max = learning_rate_max;
            config.som.learning_rate_min = learning_rate_min;
            config.som.smooth_distance_max = smooth_max;
            config.som.smooth_distance_min = smooth_min;
            config.som.threshold_neighborhood = threshold;
            config.som.annealing = if stochastic {
                Annealing::Stochastic
            } else {
                Annealing::PerCycle
            };
            config.som.batch = batch;
            config.som.shuffle = shuffle;
            config.som.init = if random_init { GridInit::Random } else { GridInit::Linear };
            config.som.seed = seed;
            config.prsom.enabled = !no_prsom;
            config.hac.linkage = linkage;
            config.hac.target_clusters = clusters;
            config.hac.label_completion = complete_labels;
            train(config, input, labels, test, output, grid_out, activations)
        }

        Commands::Prsom {
            grid,
            input,
            output,
            activations,
            variance_cycles,
            mean_cycles,
        } => {
            let mut config = Config::default();
            config.storage.overwrite = force;
            config.prsom.variance_cycles = variance_cycles;
            config.prsom.mean_cycles = mean_cycles;
            refine(config, grid, input, output, activations)
        }

        Commands::Cluster {
            input,
            labels,
            output,
            linkage,
            clusters,
            complete_labels,
        } => {
            let stop = if complete_labels {
                StopRule::LabelCompletion
            } else {
                StopRule::ClusterCount(clusters)
            };
            cluster(input, labels, output, linkage, stop, force)
        }

        Commands::Classify {
            model,
            input,
            choices,
            min_probability,
        } => classify(
            model,
            input,
            ClassifyConfig {
                n_choices: choices,
                min_probability,
            },
        ),

        Commands::Info { model } => show_info(model),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_dataset(input: &Path, labels: Option<&Path>) -> Result<Dataset> {
    let data = TextFormat::read_dataset(input)?;
    match labels {
        Some(path) => data.with_labels(TextFormat::read_labels(path)?),
        None => Ok(data),
    }
}

fn train(
    config: Config,
    input: PathBuf,
    labels: Option<PathBuf>,
    test: Option<PathBuf>,
    output: PathBuf,
    grid_out: Option<PathBuf>,
    activations: Option<PathBuf>,
) -> Result<()> {
    let start_time = Instant::now();
    let overwrite = config.storage.overwrite;

    println!("Cartographer classification engine");
    println!("   Training map from: {}", input.display());
    println!();

    let mut train = load_dataset(&input, labels.as_deref())?;
    let mut test = test.as_ref().map(TextFormat::read_dataset).transpose()?;
    println!(
        "✓ Loaded {} samples of dimension {}{}",
        train.len(),
        train.dim(),
        if train.has_labels() { " (labeled)" } else { "" }
    );

    let bar_style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA: {eta}")
        .map_err(|e| CartographerError::Config(e.to_string()))?
        .progress_chars("█▓▒░  ");
    let pb = ProgressBar::new(config.som.cycles as u64);
    pb.set_style(bar_style);
    pb.set_message("Training SOM...");

    let output_data = Pipeline::run_with_progress(&config, &mut train, test.as_mut(), |stats| {
        pb.set_position(stats.cycle as u64 + 1);
        if let Some(q) = stats.quality {
            pb.set_message(format!("Training SOM... rms {:.6}, contrast {:.4}", q.rms, q.contrast));
        }
    })?;
    pb.finish_and_clear();

    let som = &output_data.som;
    println!(
        "✓ SOM trained: {} cycles{}, rms {:.6} (best {:.6}), contrast {:.4}",
        som.cycles_run,
        if som.converged_early { " (converged early)" } else { "" },
        som.final_stats.rms,
        som.final_stats.best_rms,
        som.final_stats.contrast
    );
    if let Some(prsom) = &output_data.prsom {
        println!(
            "✓ PRSOM refined: {} cycles, rms {:.6}",
            prsom.history.len(),
            prsom.final_stats.rms
        );
    }
    println!(
        "✓ Clustered into {} classes ({} merges)",
        output_data.clustering.cluster_count,
        output_data.clustering.merges.len()
    );

    let model = &output_data.model;
    model.save(&output, overwrite)?;
    println!("✓ Model saved to {}", output.display());

    if let Some(path) = grid_out {
        let labels: Vec<f64> = model.cell_labels.iter().map(|&l| l as f64).collect();
        let annotation = if config.storage.sparse_annotations {
            Annotation::Sparse {
                values: &labels,
                threshold: config.storage.annotation_threshold,
            }
        } else {
            Annotation::Dense(&labels)
        };
        TextFormat::write_grid(&path, model.map.grid(), Some(annotation), overwrite)?;
        println!("✓ Grid saved to {}", path.display());
    }

    if let Some(path) = activations {
        TextFormat::write_activations(&path, &output_data.activations, model.map.range(), overwrite)?;
        println!("✓ Activations saved to {}", path.display());
    }

    let unassigned = output_data.rankings.iter().filter(|r| r.is_none()).count();
    if unassigned > 0 {
        println!("  {} samples could not be assigned a class", unassigned);
    }

    println!();
    println!("Training complete in {}", HumanDuration(start_time.elapsed()));
    Ok(())
}

fn refine(
    config: Config,
    grid_path: PathBuf,
    input: PathBuf,
    output: PathBuf,
    activations: Option<PathBuf>,
) -> Result<()> {
    let start_time = Instant::now();
    let overwrite = config.storage.overwrite;

    let (grid, _) = TextFormat::read_grid(&grid_path)?;
    let mut data = TextFormat::read_dataset(&input)?;

    let trainer = PrsomTrainer::new(config.prsom.clone())?;
    let mut map = trainer.init_map(grid)?;
    let report = trainer.train(&mut map, &mut data)?;
    println!(
        "✓ PRSOM refined {} cells in {} cycles: rms {:.6}",
        map.range(),
        report.history.len(),
        report.final_stats.rms
    );

    TextFormat::write_grid(&output, map.grid(), Some(Annotation::Dense(map.sigma())), overwrite)?;
    println!("✓ Grid saved to {}", output.display());

    if let Some(path) = activations {
        let rows = trainer.export_activations(&map, &data);
        TextFormat::write_activations(&path, &rows, map.range(), overwrite)?;
        println!("✓ Activations saved to {}", path.display());
    }

    println!("Completed in {}", HumanDuration(start_time.elapsed()));
    Ok(())
}

fn cluster(
    input: PathBuf,
    labels: Option<PathBuf>,
    output: PathBuf,
    linkage: Linkage,
    stop: StopRule,
    overwrite: bool,
) -> Result<()> {
    let data = load_dataset(&input, labels.as_deref())?;
    let result = Agglomerator::new(linkage, stop).fit(&HacInput::from_dataset(&data)?)?;

    let assigned: Vec<u32> = match stop {
        StopRule::LabelCompletion => result.labels.clone(),
        StopRule::ClusterCount(_) => result
            .clusters
            .iter()
            .map(|c| c.map_or(0, |id| id as u32))
            .collect(),
    };
    TextFormat::write_labels(&output, &assigned, overwrite)?;

    println!(
        "✓ {} samples in {} clusters with {} linkage",
        data.len(),
        result.cluster_count,
        linkage
    );
    if let Some(last) = result.merges.last() {
        println!("  Last merge at dissimilarity {:.6}", last.value);
    }
    println!("✓ Labels saved to {}", output.display());
    Ok(())
}

fn classify(model_path: PathBuf, input: PathBuf, config: ClassifyConfig) -> Result<()> {
    let model = Model::load(&model_path)?;
    let data = TextFormat::read_dataset(&input)?;
    let classifier = Classifier::new(&model.map, &model.cell_labels, config)?;

    for (i, ranking) in classifier.rank_all(&data)?.into_iter().enumerate() {
        match ranking {
            Some(scores) => {
                let line: Vec<String> = scores
                    .iter()
                    .map(|s| format!("{}:{:.4}", s.label, s.probability))
                    .collect();
                println!("{}\t{}", i + 1, line.join(" "));
            }
            None => println!("{}\t-", i + 1),
        }
    }
    Ok(())
}

fn show_info(model_path: PathBuf) -> Result<()> {
    let model = Model::load(&model_path)?;
    let grid = model.map.grid();

    println!("Model: {:?}", model_path);
    println!("  Grid sizes: {:?}", grid.sizes());
    println!("  Cells: {}", grid.range());
    println!("  Feature dimension: {}", grid.dim());
    println!("  Classes: {}", model.class_count());
    if let Some(linkage) = model.linkage {
        println!("  Linkage: {}", linkage);
    }
    let empty = model.map.cardinality().iter().filter(|&&c| c == 0).count();
    println!("  Empty cells: {}", empty);

    Ok(())
}
