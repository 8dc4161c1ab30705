use machine_learning::{arch::Model, optimization::Optimizer};

use crate::{
    EnsembleErr, Result,
    adversarial::fgsm_samples,
    config::TrainConfig,
    data::{DataLoader, TargetsView},
    report::{BatchRecord, Reporter},
    task::{self, Task},
};

/// Everything an estimator needs to train for one epoch, shared by every training worker.
pub struct EpochContext<'a, L> {
    pub task: Task,
    pub epoch: usize,
    pub n_outputs: usize,
    pub config: &'a TrainConfig,
    pub train: &'a L,
    pub reporter: &'a dyn Reporter,
}

/// Trains one estimator over one full pass of the training data, on both the clean batches
/// and their adversarial counterparts.
///
/// A fresh optimizer is built for the estimator on every call. For every batch the gradients
/// of the clean and the adversarial losses are accumulated and applied in a single step.
///
/// # Arguments
/// * `idx` - The index of the estimator within the ensemble.
/// * `estimator` - The estimator to train.
/// * `ctx` - The epoch's shared context.
///
/// # Returns
/// The trained estimator, or the first error found in the epoch.
pub fn fit_estimator_epoch<M, L>(
    idx: usize,
    mut estimator: M,
    ctx: &EpochContext<L>,
) -> Result<M>
where
    M: Model,
    L: DataLoader,
{
    let EpochContext {
        task,
        epoch,
        n_outputs,
        config,
        train,
        reporter,
    } = *ctx;

    let mut optimizer = config
        .optimizer
        .build(estimator.size(), config.lr, config.weight_decay);

    for (batch_idx, batch) in train.batches().enumerate() {
        let y = task.target_matrix(batch.y, n_outputs)?;

        estimator.zero_grad();
        let out = estimator.forward(batch.x)?;
        if out.dim() != y.dim() {
            return Err(EnsembleErr::SizeMismatch {
                what: "estimator output",
                got: out.ncols(),
                expected: n_outputs,
            });
        }

        let clean_loss = task.loss(out.view(), y.view());
        let x_grad = estimator.backward(task.loss_prime(out.view(), y.view()))?;

        let x_adv = fgsm_samples(batch.x, config.epsilon, x_grad.view())?;
        let adv_out = estimator.forward(x_adv.view())?;
        let adv_loss = task.loss(adv_out.view(), y.view());
        estimator.backward(task.loss_prime(adv_out.view(), y.view()))?;

        let (params, grad) = estimator.params_and_grad();
        optimizer.update_params(params, grad)?;

        if batch_idx.checked_rem(config.log_interval) == Some(0) {
            let correct = match batch.y {
                TargetsView::Classes(labels) => Some(task::correct(out.view(), labels)),
                _ => None,
            };

            reporter.batch(&BatchRecord {
                estimator: idx,
                epoch,
                batch: batch_idx,
                loss: clean_loss + adv_loss,
                batch_size: batch.len(),
                correct,
            });
        }
    }

    Ok(estimator)
}
