use machine_learning::arch::{
    Model,
    loss::{LossFn, Mse},
};

use crate::{
    EnsembleErr, Result,
    aggregate::aggregate,
    data::{DataLoader, TargetsView},
    task::{self, Task},
};

/// The best validation score of one training run.
///
/// Accuracy is maximized starting from `0` and the mean squared error is minimized starting
/// from `+inf`. Only strict improvements count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestSnapshot {
    task: Task,
    best: f32,
    epoch: Option<usize>,
}

impl BestSnapshot {
    pub fn new(task: Task) -> Self {
        let best = match task {
            Task::Classification => 0.,
            Task::Regression => f32::INFINITY,
        };

        Self {
            task,
            best,
            epoch: None,
        }
    }

    /// Whether `metric` is strictly better than the best score so far.
    pub fn improves(&self, metric: f32) -> bool {
        match self.task {
            Task::Classification => metric > self.best,
            Task::Regression => metric < self.best,
        }
    }

    /// Records the score of `epoch`.
    ///
    /// # Returns
    /// Whether the score became the new best.
    pub fn observe(&mut self, epoch: usize, metric: f32) -> bool {
        if !self.improves(metric) {
            return false;
        }

        self.best = metric;
        self.epoch = Some(epoch);
        true
    }

    pub fn best(&self) -> f32 {
        self.best
    }

    /// The epoch that achieved the best score, if any epoch improved on the initial one.
    pub fn epoch(&self) -> Option<usize> {
        self.epoch
    }
}

/// Evaluates the ensemble over a full pass of `loader`.
///
/// # Returns
/// The accuracy in percent for classification, or the mean of the per batch squared errors
/// for regression. Fails if the loader yields nothing.
pub fn evaluate<M, L>(task: Task, estimators: &[M], loader: &L, n_outputs: usize) -> Result<f32>
where
    M: Model,
    L: DataLoader,
{
    let mut batches = 0;
    let mut samples = 0;
    let mut correct = 0;
    let mut loss = 0.;

    for batch in loader.batches() {
        if batch.y.len() != batch.len() {
            return Err(EnsembleErr::SizeMismatch {
                what: "targets",
                got: batch.y.len(),
                expected: batch.len(),
            });
        }

        let out = aggregate(task, estimators, batch.x, n_outputs)?;

        match (task, batch.y) {
            (Task::Classification, TargetsView::Classes(labels)) => {
                correct += task::correct(out.view(), labels);
            }
            (Task::Regression, y) => {
                let y = task.target_matrix(y, n_outputs)?;
                loss += Mse.loss(out.view(), y.view());
            }
            (task, y) => {
                return Err(EnsembleErr::TargetKind {
                    task,
                    got: y.kind(),
                });
            }
        }

        batches += 1;
        samples += batch.len();
    }

    if batches == 0 || samples == 0 {
        return Err(EnsembleErr::EmptyLoader { what: "evaluation" });
    }

    Ok(match task {
        Task::Classification => 100. * correct as f32 / samples as f32,
        Task::Regression => loss / batches as f32,
    })
}
