//! mlstm CLI for dataset preparation, training, evaluation and model summaries.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn::prelude::*;
use mlstm::experiment::{self, ExperimentConfig};
use mlstm_core::backend::{CpuBackend, TrainBackend};
use mlstm_core::Seed;
use mlstm_data::{Cutoff, NormScope, SplitPlan};
use mlstm_train::{Monitor, MonitorMode};

#[derive(Parser)]
#[command(name = "mlstm")]
#[command(author, version)]
#[command(about = "Multivariate LSTM-FCN time series classification")]
#[command(long_about = "mlstm: prepare variable-length multivariate time series datasets, \
train MLSTM-FCN classifiers and evaluate their best checkpoints.

EXAMPLES:
  # Pad, normalize and split a raw collection
  mlstm prepare --source arabic_voice.npz --data-dir data/arabic_voice

  # Train with attention, keeping the best weights under ./weights
  mlstm train --data-dir data/arabic_voice --prefix arabic_voice_ --attention --epochs 1000

  # Reload the best checkpoint and report metrics
  mlstm eval --data-dir data/arabic_voice --prefix arabic_voice_ --attention

  # Print the layer table
  mlstm summary --data-dir data/arabic_voice --attention

Every subcommand also accepts --config with a JSON experiment file; flags
override the values it contains.")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON experiment configuration
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split, pad, normalize and label-encode a raw collection
    Prepare {
        #[command(flatten)]
        data: DataArgs,

        /// Raw .ts or .npz collection
        #[arg(long, value_name = "FILE")]
        source: Option<PathBuf>,

        /// Fraction of each class held out for testing
        #[arg(long, value_name = "RATIO")]
        test_ratio: Option<f32>,

        /// Seed for the stratified split
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,

        /// Normalization statistics scope
        #[arg(long, value_enum, value_name = "SCOPE")]
        norm_scope: Option<ScopeArg>,

        /// Fixed time-axis length
        #[arg(long, value_name = "N")]
        max_len: Option<usize>,
    },
    /// Train a model on a prepared dataset
    Train {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        run: RunArgs,

        /// Number of training epochs
        #[arg(long, value_name = "N")]
        epochs: Option<usize>,

        /// Initial learning rate for Adam
        #[arg(long, value_name = "LR")]
        lr: Option<f64>,

        /// Monitored quantity: loss, accuracy, val_loss, val_accuracy
        #[arg(long, value_name = "NAME")]
        monitor: Option<Monitor>,

        /// Improvement direction: auto, min, max
        #[arg(long, value_name = "MODE")]
        mode: Option<MonitorMode>,

        /// Disable inverse-frequency class weights
        #[arg(long)]
        no_class_weights: bool,

        /// Seed for batch shuffling
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,

        /// Write the training report as JSON
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Evaluate the best checkpoint on the test split
    Eval {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        run: RunArgs,

        /// Write the evaluation result as JSON
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Print the network's layer table
    Summary {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        model: ModelArgs,

        /// Variables per time step, when no prepared data is available
        #[arg(long, value_name = "N")]
        n_vars: Option<usize>,

        /// Time steps per sample, when no prepared data is available
        #[arg(long, value_name = "N")]
        seq_len: Option<usize>,

        /// Number of classes, when no prepared data is available
        #[arg(long, value_name = "N")]
        n_classes: Option<usize>,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Directory of the prepared arrays
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Normalize the loaded arrays with the global training mean and std;
    /// trailing all-zero steps stay zero so they remain masked
    #[arg(long)]
    normalize: bool,

    /// With --normalize, also shift the zero padding (it is then no longer
    /// masked by the LSTM)
    #[arg(long, requires = "normalize")]
    normalize_padding: bool,
}

#[derive(Args)]
struct ModelArgs {
    /// LSTM hidden units
    #[arg(long, value_name = "N")]
    lstm_cells: Option<usize>,

    /// Use the attention LSTM
    #[arg(long)]
    attention: bool,

    /// Drop the squeeze-excite gates
    #[arg(long)]
    no_squeeze: bool,

    /// Downsample the variable axis before the LSTM with this stride
    #[arg(long, value_name = "STRIDE")]
    pre_convolve: Option<usize>,
}

#[derive(Args)]
struct RunArgs {
    /// Checkpoint file name prefix
    #[arg(long, value_name = "PREFIX")]
    prefix: Option<String>,

    /// Fold id appended to the checkpoint name
    #[arg(long, value_name = "ID")]
    fold: Option<usize>,

    /// Checkpoint directory
    #[arg(long, value_name = "DIR")]
    weights_dir: Option<PathBuf>,

    /// Batch size
    #[arg(long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Shorten longer sequences from the front (pre) or the back (post)
    #[arg(long, value_name = "CUTOFF")]
    cutoff: Option<Cutoff>,

    /// Validate on the first N test samples only
    #[arg(long, value_name = "N")]
    val_subset: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    /// One mean and std per variable
    PerChannel,
    /// One mean and std for the whole array
    Global,
    /// One mean and std per (variable, step) cell
    PerPosition,
}

impl From<ScopeArg> for NormScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::PerChannel => NormScope::PerChannel,
            ScopeArg::Global => NormScope::Global,
            ScopeArg::PerPosition => NormScope::PerPosition,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("Failed to read configuration '{}'", path.display()))?,
        None => ExperimentConfig::default(),
    };

    match cli.command {
        Commands::Prepare {
            data,
            source,
            test_ratio,
            seed,
            norm_scope,
            max_len,
        } => {
            let mut config = config;
            data.apply(&mut config);
            if source.is_some() {
                config.data.source = source;
            }
            if test_ratio.is_some() || seed.is_some() {
                let (default_ratio, default_seed) = match &config.data.prepare.split {
                    SplitPlan::Stratified { test_ratio, seed } => (*test_ratio, *seed),
                    _ => (0.25, Seed::default()),
                };
                config.data.prepare.split = SplitPlan::Stratified {
                    test_ratio: test_ratio.unwrap_or(default_ratio),
                    seed: seed.map(Seed::new).unwrap_or(default_seed),
                };
            }
            if let Some(scope) = norm_scope {
                config.data.prepare.norm_scope = scope.into();
            }
            if max_len.is_some() {
                config.data.prepare.max_len = max_len;
            }
            handle_prepare(&config)
        }
        Commands::Train {
            data,
            model,
            run,
            epochs,
            lr,
            monitor,
            mode,
            no_class_weights,
            seed,
            report,
        } => {
            let mut config = config;
            data.apply(&mut config);
            model.apply(&mut config);
            run.apply(&mut config);
            if let Some(epochs) = epochs {
                config.train.epochs = epochs;
            }
            if let Some(lr) = lr {
                config.train.learning_rate = lr;
            }
            if let Some(monitor) = monitor {
                config.train.monitor = monitor;
            }
            if let Some(mode) = mode {
                config.train.monitor_mode = mode;
            }
            if no_class_weights {
                config.train.compute_class_weights = false;
            }
            if let Some(seed) = seed {
                config.train.seed = Seed::new(seed);
            }
            handle_train(&config, report.as_deref())
        }
        Commands::Eval {
            data,
            model,
            run,
            report,
        } => {
            let mut config = config;
            data.apply(&mut config);
            model.apply(&mut config);
            run.apply(&mut config);
            handle_eval(&config, report.as_deref())
        }
        Commands::Summary {
            data,
            model,
            n_vars,
            seq_len,
            n_classes,
        } => {
            let mut config = config;
            data.apply(&mut config);
            model.apply(&mut config);
            if n_vars.is_some() || seq_len.is_some() || n_classes.is_some() {
                config.infer_shape = false;
                config.model.n_vars = n_vars.unwrap_or(config.model.n_vars);
                config.model.seq_len = seq_len.unwrap_or(config.model.seq_len);
                config.model.n_classes = n_classes.unwrap_or(config.model.n_classes);
            }
            let table = experiment::summary(&config).context("Failed to build the model graph")?;
            print!("{}", table);
            Ok(())
        }
    }
}

impl DataArgs {
    fn apply(self, config: &mut ExperimentConfig) {
        if let Some(dir) = self.data_dir {
            config.data.dir = dir;
        }
        if self.normalize {
            config.data.load.normalize_timeseries = true;
        }
        if self.normalize_padding {
            tracing::warn!("normalizing padding steps; the LSTM will treat them as real input");
            config.data.load.preserve_padding = false;
        }
    }
}

impl ModelArgs {
    fn apply(self, config: &mut ExperimentConfig) {
        if let Some(cells) = self.lstm_cells {
            config.model.lstm_cells = cells;
        }
        if self.attention {
            config.model.attention = true;
        }
        if self.no_squeeze {
            config.model.squeeze = false;
        }
        if let Some(stride) = self.pre_convolve {
            config.model.pre_convolve_rnn = true;
            config.model.pre_convolve_stride = stride;
        }
    }
}

impl RunArgs {
    fn apply(self, config: &mut ExperimentConfig) {
        if let Some(prefix) = self.prefix {
            config.train.dataset_prefix = prefix;
        }
        if self.fold.is_some() {
            config.train.dataset_fold_id = self.fold;
        }
        if let Some(dir) = self.weights_dir {
            config.train.weights_dir = dir;
        }
        if let Some(batch_size) = self.batch_size {
            config.train.batch_size = batch_size;
        }
        if self.cutoff.is_some() {
            config.train.cutoff = self.cutoff;
        }
        if self.val_subset.is_some() {
            config.train.val_subset = self.val_subset;
        }
    }
}

fn handle_prepare(config: &ExperimentConfig) -> Result<()> {
    let prepared = experiment::run_prepare(config).context("Failed to prepare dataset")?;
    let metadata = prepared.metadata();

    println!("Prepared dataset in {}", config.data.dir.display());
    println!("─────────────────────────────────────────");
    println!("  Variables:       {}", metadata.n_vars);
    println!("  Sequence length: {}", metadata.seq_len);
    println!("  Classes:         {:?}", metadata.classes);
    println!("  Train samples:   {}", prepared.y_train().len());
    println!("  Test samples:    {}", prepared.y_test().len());
    Ok(())
}

fn handle_train(config: &ExperimentConfig, report_path: Option<&Path>) -> Result<()> {
    let device = <TrainBackend as Backend>::Device::default();
    let report =
        experiment::run_train::<TrainBackend>(config, &device).context("Training failed")?;

    println!(
        "{:>6}  {:>10}  {:>9}  {:>10}  {:>9}  {:>10}",
        "epoch", "loss", "accuracy", "val_loss", "val_acc", "lr"
    );
    for record in &report.history {
        println!(
            "{:>6}  {:>10.6}  {:>9.4}  {:>10.6}  {:>9.4}  {:>10.2e}",
            record.epoch + 1,
            record.loss,
            record.accuracy,
            record.val_loss,
            record.val_accuracy,
            record.lr
        );
    }
    println!("\nTraining complete in {:.1}s", report.elapsed_secs);
    match (report.best_epoch, report.best_value) {
        (Some(epoch), Some(value)) => println!(
            "Best {}: {:.6} at epoch {} -> {}",
            report.monitor,
            value,
            epoch + 1,
            report.checkpoint.display()
        ),
        _ => println!("No improvement recorded; no weights were saved"),
    }

    if let Some(path) = report_path {
        write_json(path, &report)?;
    }
    Ok(())
}

fn handle_eval(config: &ExperimentConfig, report_path: Option<&Path>) -> Result<()> {
    let device = <CpuBackend as Backend>::Device::default();
    let result = experiment::run_eval::<CpuBackend>(config, &device).context("Evaluation failed")?;

    print!("{}", result.summary());
    if let Some(path) = report_path {
        write_json(path, &result)?;
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write '{}'", path.display()))
}
