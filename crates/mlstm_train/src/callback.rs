//! Monitored quantities and best-only checkpointing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TrainError};
use crate::trainer::EpochRecord;
use mlstm_models::CheckpointPaths;

/// Quantity recorded each epoch that callbacks can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    /// Training loss.
    #[default]
    Loss,
    /// Training accuracy.
    Accuracy,
    /// Validation loss.
    ValLoss,
    /// Validation accuracy.
    ValAccuracy,
}

impl Monitor {
    /// Name used in logs and checkpoint metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Monitor::Loss => "loss",
            Monitor::Accuracy => "accuracy",
            Monitor::ValLoss => "val_loss",
            Monitor::ValAccuracy => "val_accuracy",
        }
    }

    /// Whether this is an accuracy quantity.
    pub fn is_accuracy(&self) -> bool {
        matches!(self, Monitor::Accuracy | Monitor::ValAccuracy)
    }

    /// Read the monitored value from an epoch record.
    pub fn value(&self, record: &EpochRecord) -> f64 {
        match self {
            Monitor::Loss => record.loss,
            Monitor::Accuracy => record.accuracy,
            Monitor::ValLoss => record.val_loss,
            Monitor::ValAccuracy => record.val_accuracy,
        }
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Monitor {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "loss" => Ok(Monitor::Loss),
            "accuracy" | "acc" => Ok(Monitor::Accuracy),
            "val_loss" => Ok(Monitor::ValLoss),
            "val_accuracy" | "val_acc" => Ok(Monitor::ValAccuracy),
            other => Err(TrainError::InvalidConfig(format!(
                "unknown monitor '{}', expected loss, accuracy, val_loss or val_accuracy",
                other
            ))),
        }
    }
}

/// How improvement of a monitored quantity is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Maximize accuracies, minimize losses.
    #[default]
    Auto,
    /// Lower is better.
    Min,
    /// Higher is better.
    Max,
}

impl MonitorMode {
    /// Concrete direction for `monitor`.
    pub fn resolve(self, monitor: Monitor) -> Direction {
        match self {
            MonitorMode::Min => Direction::Min,
            MonitorMode::Max => Direction::Max,
            MonitorMode::Auto if monitor.is_accuracy() => Direction::Max,
            MonitorMode::Auto => Direction::Min,
        }
    }
}

impl FromStr for MonitorMode {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(MonitorMode::Auto),
            "min" => Ok(MonitorMode::Min),
            "max" => Ok(MonitorMode::Max),
            other => Err(TrainError::InvalidConfig(format!(
                "unknown monitor mode '{}', expected auto, min or max",
                other
            ))),
        }
    }
}

/// Resolved optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lower is better.
    Min,
    /// Higher is better.
    Max,
}

impl Direction {
    /// Whether `current` beats `best` by more than `min_delta`.
    ///
    /// Anything beats a missing best; NaN never improves.
    pub fn is_improvement(self, current: f64, best: Option<f64>, min_delta: f64) -> bool {
        if current.is_nan() {
            return false;
        }
        match (self, best) {
            (_, None) => true,
            (Direction::Min, Some(best)) => current < best - min_delta,
            (Direction::Max, Some(best)) => current > best + min_delta,
        }
    }
}

/// Best-only model checkpoint.
///
/// Tracks the best value of a monitored quantity and tells the trainer when
/// the weights should be written, which happens only on strict improvement.
///
/// # Example
///
/// ```rust,ignore
/// use mlstm_train::{ModelCheckpoint, Monitor, MonitorMode};
///
/// let mut checkpoint = ModelCheckpoint::new(paths, Monitor::Loss, MonitorMode::Auto);
/// if checkpoint.on_epoch_end(&record) {
///     save_checkpoint(&model, checkpoint.paths(), &metadata)?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    paths: CheckpointPaths,
    monitor: Monitor,
    direction: Direction,
    best: Option<f64>,
    best_epoch: Option<usize>,
    saves: usize,
}

impl ModelCheckpoint {
    /// Create a checkpoint monitor writing to `paths`.
    pub fn new(paths: CheckpointPaths, monitor: Monitor, mode: MonitorMode) -> Self {
        Self {
            paths,
            monitor,
            direction: mode.resolve(monitor),
            best: None,
            best_epoch: None,
            saves: 0,
        }
    }

    /// Where the weights are written.
    pub fn paths(&self) -> &CheckpointPaths {
        &self.paths
    }

    /// Monitored quantity.
    pub fn monitor(&self) -> Monitor {
        self.monitor
    }

    /// Resolved direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Best value seen so far.
    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Epoch of the best value.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Number of improvements, i.e. weight writes requested.
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// Record an epoch; returns `true` when the weights should be saved.
    pub fn on_epoch_end(&mut self, record: &EpochRecord) -> bool {
        let current = self.monitor.value(record);
        if self.direction.is_improvement(current, self.best, 0.0) {
            match self.best {
                Some(previous) => info!(
                    epoch = record.epoch + 1,
                    monitor = self.monitor.name(),
                    from = previous,
                    to = current,
                    path = %self.paths.weights.display(),
                    "monitored value improved, saving weights"
                ),
                None => info!(
                    epoch = record.epoch + 1,
                    monitor = self.monitor.name(),
                    value = current,
                    path = %self.paths.weights.display(),
                    "saving weights"
                ),
            }
            self.best = Some(current);
            self.best_epoch = Some(record.epoch);
            self.saves += 1;
            true
        } else {
            debug!(
                epoch = record.epoch + 1,
                monitor = self.monitor.name(),
                value = current,
                best = ?self.best,
                "monitored value did not improve"
            );
            false
        }
    }
}
