//! Learning-rate reduction on plateau.

use tracing::info;

use crate::callback::{Direction, Monitor, MonitorMode};
use crate::error::{Result, TrainError};
use crate::trainer::EpochRecord;

/// Reduction factor used for time-series inputs, `1 / cbrt(2)`.
pub const TIMESERIES_FACTOR: f64 = 0.793_700_525_984_099_7;

/// Reduction factor used for other inputs, `1 / sqrt(2)`.
pub const DEFAULT_FACTOR: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Reduction factor for the kind of input.
pub fn plateau_factor(is_timeseries: bool) -> f64 {
    if is_timeseries {
        TIMESERIES_FACTOR
    } else {
        DEFAULT_FACTOR
    }
}

/// Reduces the learning rate when a monitored quantity stops improving.
///
/// After `patience` epochs without an improvement larger than `min_delta`,
/// the rate is multiplied by `factor` and clamped to `min_lr`, followed by
/// `cooldown` epochs in which bad epochs are not counted.
#[derive(Debug, Clone)]
pub struct ReduceLROnPlateau {
    current_lr: f64,
    factor: f64,
    patience: usize,
    min_lr: f64,
    min_delta: f64,
    cooldown: usize,
    monitor: Monitor,
    direction: Direction,
    best: Option<f64>,
    wait: usize,
    cooldown_counter: usize,
}

impl ReduceLROnPlateau {
    /// Create a scheduler.
    ///
    /// # Arguments
    /// * `initial_lr` - Starting learning rate
    /// * `factor` - Multiplier applied on reduction, in `(0, 1)`
    /// * `patience` - Epochs without improvement before reducing
    /// * `min_lr` - Lower bound on the learning rate
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::InvalidLearningRate`] for a non-positive rate and
    /// [`TrainError::InvalidConfig`] for a factor outside `(0, 1)`.
    pub fn new(initial_lr: f64, factor: f64, patience: usize, min_lr: f64) -> Result<Self> {
        if initial_lr <= 0.0 || !initial_lr.is_finite() {
            return Err(TrainError::InvalidLearningRate(initial_lr));
        }
        if factor.is_nan() || factor <= 0.0 || factor >= 1.0 {
            return Err(TrainError::InvalidConfig(format!(
                "plateau factor must be in (0, 1), got {}",
                factor
            )));
        }
        Ok(Self {
            current_lr: initial_lr,
            factor,
            patience,
            min_lr,
            min_delta: 1e-4,
            cooldown: 0,
            monitor: Monitor::Loss,
            direction: Direction::Min,
            best: None,
            wait: 0,
            cooldown_counter: 0,
        })
    }

    /// Watch `monitor` in `mode`.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Monitor, mode: MonitorMode) -> Self {
        self.monitor = monitor;
        self.direction = mode.resolve(monitor);
        self
    }

    /// Minimum change counted as improvement.
    #[must_use]
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Epochs to wait after a reduction before counting bad epochs again.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Update with the monitored value of an epoch record.
    ///
    /// Returns true if the learning rate was reduced.
    pub fn on_epoch_end(&mut self, record: &EpochRecord) -> bool {
        self.step(self.monitor.value(record))
    }

    /// Update with a new monitored value.
    ///
    /// Returns true if the learning rate was reduced.
    pub fn step(&mut self, value: f64) -> bool {
        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.wait = 0;
        }

        if self.direction.is_improvement(value, self.best, self.min_delta) {
            self.best = Some(value);
            self.wait = 0;
            return false;
        }
        if self.cooldown_counter > 0 {
            return false;
        }

        self.wait += 1;
        if self.wait < self.patience || self.current_lr <= self.min_lr {
            return false;
        }
        let new_lr = (self.current_lr * self.factor).max(self.min_lr);
        info!(
            monitor = self.monitor.name(),
            from = self.current_lr,
            to = new_lr,
            "reducing learning rate"
        );
        self.current_lr = new_lr;
        self.cooldown_counter = self.cooldown;
        self.wait = 0;
        true
    }

    /// Current learning rate.
    pub fn current_lr(&self) -> f64 {
        self.current_lr
    }

    /// Lower bound on the learning rate.
    pub fn min_lr(&self) -> f64 {
        self.min_lr
    }
}
