use std::{num::NonZeroUsize, path::PathBuf};

use log::error;
use machine_learning::optimization::{Adam, GradientDescent, Optimizer, RmsProp};
use serde::{Deserialize, Serialize};

use crate::{EnsembleErr, Result};

/// The optimizers an estimator can be trained with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    #[default]
    Adam,
    RmsProp,
}

impl OptimizerKind {
    /// Builds a fresh optimizer of this kind.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters the optimizer will update.
    /// * `lr` - The learning rate.
    /// * `weight_decay` - The L2 penalty added to every gradient.
    ///
    /// # Returns
    /// A boxed optimizer with empty state.
    pub fn build(self, len: usize, lr: f32, weight_decay: f32) -> Box<dyn Optimizer + Send> {
        match self {
            OptimizerKind::Sgd => Box::new(GradientDescent::new(lr, weight_decay)),
            OptimizerKind::Adam => Box::new(Adam::with_defaults(len, lr, weight_decay)),
            OptimizerKind::RmsProp => Box::new(RmsProp::with_defaults(len, lr, weight_decay)),
        }
    }
}

/// Where the estimators run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
}

/// The hyperparameters of a single `fit` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub lr: f32,
    pub weight_decay: f32,
    pub epochs: usize,
    pub optimizer: OptimizerKind,
    /// The step size of the adversarial perturbation, in `(0, 1]`.
    pub epsilon: f32,
    /// Every how many batches a progress record is emitted.
    pub log_interval: usize,
    pub save_model: bool,
    /// Where the best ensemble is saved, the current directory if unset.
    pub save_dir: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            weight_decay: 5e-4,
            epochs: 100,
            optimizer: OptimizerKind::Adam,
            epsilon: 0.5,
            log_interval: 100,
            save_model: true,
            save_dir: None,
        }
    }
}

impl TrainConfig {
    /// Checks every hyperparameter, in declaration order, before any training work starts.
    ///
    /// # Returns
    /// An `InvalidHyperparameter` error for the first parameter out of its range.
    pub fn validate(&self) -> Result<()> {
        self.check().inspect_err(|e| error!("{e}"))
    }

    fn check(&self) -> Result<()> {
        let invalid = |name, value, constraint| EnsembleErr::InvalidHyperparameter {
            name,
            value,
            constraint,
        };

        // Written as negations so that NaN is rejected too.
        if !(self.lr > 0.) {
            return Err(invalid("lr", self.lr as f64, "a positive value"));
        }
        if !(self.weight_decay >= 0.) {
            return Err(invalid(
                "weight_decay",
                self.weight_decay as f64,
                "a non-negative value",
            ));
        }
        if self.epochs == 0 {
            return Err(invalid("epochs", 0., "a positive value"));
        }
        if !(self.epsilon > 0. && self.epsilon <= 1.) {
            return Err(invalid("epsilon", self.epsilon as f64, "a value in (0, 1]"));
        }
        if self.log_interval == 0 {
            return Err(invalid("log_interval", 0., "a positive value"));
        }

        Ok(())
    }
}

/// The construction-time settings of an ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub n_estimators: NonZeroUsize,
    /// The size of the worker pool, `None` or `0` lets rayon decide.
    #[serde(default)]
    pub n_jobs: Option<usize>,
    #[serde(default)]
    pub device: Device,
}

impl EnsembleConfig {
    /// Creates a new `EnsembleConfig` on the cpu with an automatically sized pool.
    ///
    /// # Arguments
    /// * `n_estimators` - The amount of base estimators.
    pub fn new(n_estimators: NonZeroUsize) -> Self {
        Self {
            n_estimators,
            n_jobs: None,
            device: Device::Cpu,
        }
    }

    pub fn with_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }
}
