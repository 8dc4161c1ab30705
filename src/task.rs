use std::{collections::HashSet, fmt};

use machine_learning::arch::loss::{CrossEntropy, LossFn, Mse};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::{
    EnsembleErr, Result,
    data::{DataLoader, TargetsView},
};

/// What the ensemble learns: it either picks one of `n_outputs` classes or regresses
/// `n_outputs` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Classification,
    Regression,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Classification => write!(f, "classification"),
            Task::Regression => write!(f, "regression"),
        }
    }
}

impl Task {
    /// Turns a batch of targets into the matrix the estimators' outputs are compared against:
    /// one-hot rows for class labels and one column per regressed value otherwise.
    ///
    /// # Arguments
    /// * `y` - The batch's targets.
    /// * `n_outputs` - The width of the estimators' outputs.
    ///
    /// # Returns
    /// The target matrix, or an error if the targets don't fit this task.
    pub fn target_matrix(self, y: TargetsView, n_outputs: usize) -> Result<Array2<f32>> {
        match (self, y) {
            (Task::Classification, TargetsView::Classes(labels)) => {
                let mut one_hot = Array2::zeros((labels.len(), n_outputs));

                for (mut row, &label) in one_hot.rows_mut().into_iter().zip(labels) {
                    if label >= n_outputs {
                        return Err(EnsembleErr::LabelOutOfRange { label, n_outputs });
                    }
                    row[label] = 1.;
                }

                Ok(one_hot)
            }
            (Task::Regression, TargetsView::Scalars(values)) => {
                check_width(1, n_outputs)?;
                Ok(values.to_owned().insert_axis(Axis(1)))
            }
            (Task::Regression, TargetsView::Vectors(values)) => {
                check_width(values.ncols(), n_outputs)?;
                Ok(values.to_owned())
            }
            (task, y) => Err(EnsembleErr::TargetKind {
                task,
                got: y.kind(),
            }),
        }
    }

    /// The loss minimized for this task: cross entropy over logits or mean squared error.
    pub fn loss(self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        match self {
            Task::Classification => CrossEntropy.loss(y_pred, y),
            Task::Regression => Mse.loss(y_pred, y),
        }
    }

    /// The derivative of `loss` with respect to `y_pred`.
    pub fn loss_prime(self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Task::Classification => CrossEntropy.loss_prime(y_pred, y),
            Task::Regression => Mse.loss_prime(y_pred, y),
        }
    }

    /// Decides the width of the estimators' outputs from the training data.
    ///
    /// Classification uses the loader's class count if it has one and otherwise counts the
    /// distinct labels of a full pass. Regression uses the trailing dimension of the first
    /// batch's targets.
    ///
    /// # Returns
    /// The amount of outputs, or an error if the loader is empty or its targets don't fit
    /// this task.
    pub fn n_outputs<L: DataLoader>(self, loader: &L) -> Result<usize> {
        let mut batches = loader.batches().peekable();
        let first = batches
            .peek()
            .ok_or(EnsembleErr::EmptyLoader { what: "training" })?
            .y;

        match (self, first) {
            (Task::Classification, TargetsView::Classes(_)) => {
                if let Some(classes) = loader.classes() {
                    return Ok(classes);
                }

                let mut seen = HashSet::new();
                for batch in batches {
                    let TargetsView::Classes(labels) = batch.y else {
                        return Err(EnsembleErr::TargetKind {
                            task: self,
                            got: batch.y.kind(),
                        });
                    };
                    seen.extend(labels.iter().copied());
                }

                Ok(seen.len())
            }
            (Task::Regression, TargetsView::Scalars(_)) => Ok(1),
            (Task::Regression, TargetsView::Vectors(values)) => Ok(values.ncols()),
            (task, y) => Err(EnsembleErr::TargetKind {
                task,
                got: y.kind(),
            }),
        }
    }
}

/// Counts the rows whose highest scoring column is the row's label.
pub fn correct(y_pred: ArrayView2<f32>, labels: ArrayView1<usize>) -> usize {
    Zip::from(y_pred.rows())
        .and(&labels)
        .fold(0, |acc, row, &label| acc + usize::from(argmax(row) == label))
}

/// Returns the index of the first maximum of `row`.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    row.indexed_iter()
        .fold((0, f32::NEG_INFINITY), |(best_i, best), (i, &v)| {
            if v > best { (i, v) } else { (best_i, best) }
        })
        .0
}

fn check_width(got: usize, n_outputs: usize) -> Result<()> {
    if got != n_outputs {
        return Err(EnsembleErr::SizeMismatch {
            what: "target width",
            got,
            expected: n_outputs,
        });
    }

    Ok(())
}
