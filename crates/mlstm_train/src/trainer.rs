//! Training loop.
//!
//! One epoch is a shuffled pass over the weighted training split followed by
//! an unweighted pass over the (optionally subset) test split. After each
//! epoch the checkpoint monitor decides whether to persist the weights and
//! the plateau scheduler decides whether to lower the learning rate.

use std::path::PathBuf;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::callback::{ModelCheckpoint, Monitor, MonitorMode};
use crate::error::{Result, TrainError};
use crate::evaluation::host_predictions;
use crate::loss::WeightedCrossEntropy;
use crate::scheduler::{plateau_factor, ReduceLROnPlateau};
use mlstm_core::Seed;
use mlstm_data::{Cutoff, DataLoader, DatasetContext};
use mlstm_models::{
    save_checkpoint, CheckpointMetadata, CheckpointPaths, MlstmFcn, MlstmFcnConfig,
    OutputActivation,
};

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of epochs.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Validate on the first `n` test samples only.
    pub val_subset: Option<usize>,
    /// How to shorten sequences longer than the model's input length.
    pub cutoff: Option<Cutoff>,
    /// Prefix of the checkpoint file names.
    pub dataset_prefix: String,
    /// Fold id appended to the checkpoint file names.
    pub dataset_fold_id: Option<usize>,
    /// Initial Adam learning rate.
    pub learning_rate: f64,
    /// Quantity watched by the checkpoint and the scheduler.
    pub monitor: Monitor,
    /// Improvement direction for `monitor`.
    pub monitor_mode: MonitorMode,
    /// Weight samples by inverse class frequency.
    pub compute_class_weights: bool,
    /// Directory holding the checkpoints.
    pub weights_dir: PathBuf,
    /// Seed for batch shuffling.
    pub seed: Seed,
    /// Plateau epochs before the learning rate is reduced.
    pub patience: usize,
    /// Lower bound on the learning rate.
    pub min_lr: f64,
    /// Minimum change counted as improvement by the scheduler.
    pub min_delta: f64,
    /// Epochs without counting after a reduction.
    pub cooldown: usize,
    /// Shuffle the training split every epoch.
    pub shuffle: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 128,
            val_subset: None,
            cutoff: None,
            dataset_prefix: "rename_me_".to_string(),
            dataset_fold_id: None,
            learning_rate: 1e-3,
            monitor: Monitor::Loss,
            monitor_mode: MonitorMode::Auto,
            compute_class_weights: true,
            weights_dir: PathBuf::from("./weights"),
            seed: Seed::default(),
            patience: 100,
            min_lr: 1e-4,
            min_delta: 1e-4,
            cooldown: 0,
            shuffle: true,
        }
    }
}

impl TrainConfig {
    /// Set the number of epochs.
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validate on a prefix of the test split.
    #[must_use]
    pub fn with_val_subset(mut self, n: Option<usize>) -> Self {
        self.val_subset = n;
        self
    }

    /// Set the cutoff direction.
    #[must_use]
    pub fn with_cutoff(mut self, cutoff: Option<Cutoff>) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Set the checkpoint prefix.
    #[must_use]
    pub fn with_dataset_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dataset_prefix = prefix.into();
        self
    }

    /// Set the fold id.
    #[must_use]
    pub fn with_dataset_fold_id(mut self, fold: Option<usize>) -> Self {
        self.dataset_fold_id = fold;
        self
    }

    /// Set the initial learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the monitored quantity and mode.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Monitor, mode: MonitorMode) -> Self {
        self.monitor = monitor;
        self.monitor_mode = mode;
        self
    }

    /// Enable or disable balanced class weights.
    #[must_use]
    pub fn with_class_weights(mut self, enabled: bool) -> Self {
        self.compute_class_weights = enabled;
        self
    }

    /// Set the checkpoint directory.
    #[must_use]
    pub fn with_weights_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.weights_dir = dir.into();
        self
    }

    /// Set the shuffling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Set the plateau patience.
    #[must_use]
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Set the learning-rate floor.
    #[must_use]
    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    /// Checkpoint locations for the configured prefix and fold.
    pub fn checkpoint_paths(&self) -> CheckpointPaths {
        CheckpointPaths::new(&self.weights_dir, &self.dataset_prefix, self.dataset_fold_id)
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::InvalidConfig`] or
    /// [`TrainError::InvalidLearningRate`].
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainError::InvalidConfig("epochs must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(TrainError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.val_subset == Some(0) {
            return Err(TrainError::InvalidConfig("val_subset must be > 0".into()));
        }
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(TrainError::InvalidLearningRate(self.learning_rate));
        }
        if self.min_lr < 0.0 || self.min_lr > self.learning_rate {
            return Err(TrainError::InvalidConfig(format!(
                "min_lr {} must be in [0, learning_rate]",
                self.min_lr
            )));
        }
        Ok(())
    }
}

/// Metrics of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Epoch (0-indexed).
    pub epoch: usize,
    /// Mean weighted training loss.
    pub loss: f64,
    /// Training accuracy.
    pub accuracy: f64,
    /// Mean validation loss.
    pub val_loss: f64,
    /// Validation accuracy.
    pub val_accuracy: f64,
    /// Learning rate used during the epoch.
    pub lr: f64,
}

/// Summary of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// One record per epoch.
    pub history: Vec<EpochRecord>,
    /// Monitored quantity.
    pub monitor: Monitor,
    /// Epoch of the saved weights.
    pub best_epoch: Option<usize>,
    /// Monitored value of the saved weights.
    pub best_value: Option<f64>,
    /// Weights file of the best epoch.
    pub checkpoint: PathBuf,
    /// Wall-clock training time.
    pub elapsed_secs: f64,
}

impl TrainingReport {
    /// Record of the last epoch.
    pub fn last(&self) -> Option<&EpochRecord> {
        self.history.last()
    }
}

/// Final model plus the run summary.
#[derive(Debug)]
pub struct TrainingOutput<M> {
    /// Model after the last epoch; the best weights are on disk.
    pub model: M,
    /// Run summary.
    pub report: TrainingReport,
}

/// Fit the data to the model's input length and check its dimensions.
///
/// Sequences are cut or padded to `model_config.seq_len` and the test split
/// is reduced to `config.val_subset` samples when set.
///
/// # Errors
///
/// Returns [`TrainError::InvalidConfig`] when the variable or class count
/// disagrees with the model, and propagates cutoff errors.
pub fn prepare_data(
    model_config: &MlstmFcnConfig,
    data: &DatasetContext,
    config: &TrainConfig,
) -> Result<DatasetContext> {
    if data.n_vars() != model_config.n_vars {
        return Err(TrainError::InvalidConfig(format!(
            "model expects {} variables, dataset has {}",
            model_config.n_vars,
            data.n_vars()
        )));
    }
    if data.n_classes() != model_config.n_classes {
        return Err(TrainError::InvalidConfig(format!(
            "model expects {} classes, dataset has {}",
            model_config.n_classes,
            data.n_classes()
        )));
    }
    let data = data.fit_to_length(model_config.seq_len, config.cutoff)?;
    Ok(match config.val_subset {
        Some(n) => data.subset_test(n),
        None => data,
    })
}

/// Trainer for classification models.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a new trainer.
    pub fn new(config: TrainConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Training configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Build an MLSTM-FCN from `model_config` and train it on `data`.
    ///
    /// The best weights are written to
    /// [`TrainConfig::checkpoint_paths`] together with the configuration and
    /// the class labels.
    ///
    /// # Errors
    ///
    /// Propagates configuration, data, model and checkpoint errors.
    pub fn fit(
        &self,
        model_config: &MlstmFcnConfig,
        data: &DatasetContext,
    ) -> Result<TrainingOutput<MlstmFcn<B>>> {
        let data = prepare_data(model_config, data, &self.config)?;
        let model = model_config.init::<B>(&self.device)?;
        info!(
            params = model.num_params(),
            n_train = data.y_train().len(),
            n_val = data.n_test(),
            "training MLSTM-FCN"
        );

        let paths = self.config.checkpoint_paths();
        let metadata =
            CheckpointMetadata::new(model_config.clone()).with_classes(data.classes().to_vec());
        let monitor = self.config.monitor;
        let loss_fn = WeightedCrossEntropy::new()
            .with_from_logits(model_config.output_activation == OutputActivation::Linear);

        self.fit_with_forward(
            model,
            &data,
            loss_fn,
            |model, x| model.forward(x),
            |model, x| model.forward(x),
            |model, record| {
                let metadata = metadata.clone().with_monitor(
                    record.epoch,
                    monitor.name(),
                    monitor.value(record),
                );
                save_checkpoint(model, &paths, &metadata)?;
                Ok(())
            },
        )
    }

    /// Train any classification module through forward closures.
    ///
    /// `save_fn` receives the inference copy of the model whenever the
    /// monitored quantity improves.
    ///
    /// # Errors
    ///
    /// Propagates configuration and data errors, returns
    /// [`TrainError::NonFiniteLoss`] when the training loss diverges, and
    /// propagates `save_fn` errors.
    pub fn fit_with_forward<M, F, G, S>(
        &self,
        model: M,
        data: &DatasetContext,
        loss_fn: WeightedCrossEntropy,
        forward_fn: F,
        valid_forward_fn: G,
        mut save_fn: S,
    ) -> Result<TrainingOutput<M>>
    where
        M: AutodiffModule<B> + Clone,
        F: Fn(&M, Tensor<B, 3>) -> Tensor<B, 2>,
        G: Fn(&M::InnerModule, Tensor<B::InnerBackend, 3>) -> Tensor<B::InnerBackend, 2>,
        S: FnMut(&M::InnerModule, &EpochRecord) -> Result<()>,
    {
        self.config.validate()?;
        let start_time = Instant::now();

        let class_weights = data.class_weights(self.config.compute_class_weights)?;
        debug!(weights = ?class_weights.weights(), "class weights");

        let train_loader = DataLoader::builder(data.train_dataset(&class_weights)?)
            .batch_size(self.config.batch_size)
            .shuffle(self.config.shuffle)
            .seed(self.config.seed.derive("train"))
            .build()?;
        let valid_loader = DataLoader::builder(data.test_dataset()?)
            .batch_size(self.config.batch_size)
            .build()?;

        let mut optim = AdamConfig::new().init::<B, M>();
        let mut scheduler = ReduceLROnPlateau::new(
            self.config.learning_rate,
            plateau_factor(data.is_timeseries()),
            self.config.patience,
            self.config.min_lr,
        )?
        .with_monitor(self.config.monitor, self.config.monitor_mode)
        .with_min_delta(self.config.min_delta)
        .with_cooldown(self.config.cooldown);
        let mut checkpoint = ModelCheckpoint::new(
            self.config.checkpoint_paths(),
            self.config.monitor,
            self.config.monitor_mode,
        );

        let mut history = Vec::with_capacity(self.config.epochs);
        let mut current_model = model;

        for epoch in 0..self.config.epochs {
            let lr = scheduler.current_lr();
            let (loss, accuracy) = self.train_epoch(
                &mut current_model,
                &mut optim,
                &train_loader,
                &loss_fn,
                lr,
                epoch,
                &forward_fn,
            )?;
            if !loss.is_finite() {
                return Err(TrainError::NonFiniteLoss { epoch });
            }

            let inner_model = current_model.valid();
            let (val_loss, val_accuracy) =
                self.valid_epoch(&inner_model, &valid_loader, &loss_fn, &valid_forward_fn)?;

            let record = EpochRecord {
                epoch,
                loss,
                accuracy,
                val_loss,
                val_accuracy,
                lr,
            };
            debug!(
                epoch = epoch + 1,
                epochs = self.config.epochs,
                loss = record.loss,
                accuracy = record.accuracy,
                val_loss = record.val_loss,
                val_accuracy = record.val_accuracy,
                lr,
                "epoch complete"
            );

            if checkpoint.on_epoch_end(&record) {
                save_fn(&inner_model, &record)?;
            }
            scheduler.on_epoch_end(&record);
            history.push(record);
        }

        let elapsed_secs = start_time.elapsed().as_secs_f64();
        info!(
            elapsed_secs,
            best_epoch = ?checkpoint.best_epoch().map(|e| e + 1),
            best = ?checkpoint.best(),
            monitor = self.config.monitor.name(),
            "training complete"
        );

        Ok(TrainingOutput {
            model: current_model,
            report: TrainingReport {
                history,
                monitor: self.config.monitor,
                best_epoch: checkpoint.best_epoch(),
                best_value: checkpoint.best(),
                checkpoint: checkpoint.paths().weights.clone(),
                elapsed_secs,
            },
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn train_epoch<M, O, F>(
        &self,
        model: &mut M,
        optim: &mut O,
        loader: &DataLoader,
        loss_fn: &WeightedCrossEntropy,
        lr: f64,
        epoch: usize,
        forward_fn: &F,
    ) -> Result<(f64, f64)>
    where
        M: AutodiffModule<B> + Clone,
        O: Optimizer<M, B>,
        F: Fn(&M, Tensor<B, 3>) -> Tensor<B, 2>,
    {
        let mut total_loss = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for batch in loader.iter::<B>(&self.device, epoch) {
            let batch = batch?;
            let n = batch.len();

            let scores = forward_fn(model, batch.x);
            correct += count_correct(&host_predictions(scores.clone()), &batch.labels);

            let loss = loss_fn.forward(scores, batch.targets, batch.weights);
            total_loss += loss.clone().into_scalar().elem::<f64>() * n as f64;
            seen += n;

            let grads = GradientsParams::from_grads(loss.backward(), model);
            *model = optim.step(lr, model.clone(), grads);
        }

        Ok(mean_pair(total_loss, correct, seen))
    }

    fn valid_epoch<M, G>(
        &self,
        model: &M,
        loader: &DataLoader,
        loss_fn: &WeightedCrossEntropy,
        valid_forward_fn: &G,
    ) -> Result<(f64, f64)>
    where
        G: Fn(&M, Tensor<B::InnerBackend, 3>) -> Tensor<B::InnerBackend, 2>,
    {
        let inner_device: <B::InnerBackend as Backend>::Device = self.device.clone();

        let mut total_loss = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for batch in loader.iter::<B::InnerBackend>(&inner_device, 0) {
            let batch = batch?;
            let n = batch.len();

            let scores = valid_forward_fn(model, batch.x);
            correct += count_correct(&host_predictions(scores.clone()), &batch.labels);

            let loss = loss_fn.forward(scores, batch.targets, batch.weights);
            total_loss += loss.into_scalar().elem::<f64>() * n as f64;
            seen += n;
        }

        Ok(mean_pair(total_loss, correct, seen))
    }
}

fn count_correct(predictions: &[usize], labels: &[usize]) -> usize {
    predictions
        .iter()
        .zip(labels)
        .filter(|(p, t)| p == t)
        .count()
}

fn mean_pair(total_loss: f64, correct: usize, seen: usize) -> (f64, f64) {
    if seen == 0 {
        (0.0, 0.0)
    } else {
        (total_loss / seen as f64, correct as f64 / seen as f64)
    }
}
