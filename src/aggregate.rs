use machine_learning::arch::{Model, activations::softmax};
use ndarray::{Array2, ArrayView2};

use crate::{EnsembleErr, Result, task::Task};

/// Combines the outputs of every estimator into the ensemble's output: the mean of the
/// class probabilities for classification and the mean of the outputs for regression.
///
/// # Arguments
/// * `task` - Decides how the outputs are combined.
/// * `estimators` - The estimators to combine, in inference mode.
/// * `x` - The input batch.
/// * `n_outputs` - The width every estimator's output must have.
///
/// # Returns
/// A `(batch, n_outputs)` matrix, or an error if an estimator fails or outputs another shape.
pub fn aggregate<M: Model>(
    task: Task,
    estimators: &[M],
    x: ArrayView2<f32>,
    n_outputs: usize,
) -> Result<Array2<f32>> {
    if estimators.is_empty() {
        return Err(EnsembleErr::NotFitted);
    }

    let mut sum = Array2::zeros((x.nrows(), n_outputs));

    for estimator in estimators {
        let out = estimator.infer(x)?;
        if out.dim() != sum.dim() {
            return Err(EnsembleErr::SizeMismatch {
                what: "estimator output",
                got: out.ncols(),
                expected: n_outputs,
            });
        }

        match task {
            Task::Classification => sum += &softmax(out.view()),
            Task::Regression => sum += &out,
        }
    }

    Ok(sum / estimators.len() as f32)
}
