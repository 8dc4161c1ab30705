use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;
use crate::arch::activations::softmax;

/// Cross entropy loss over raw logits. The targets are one-hot (or any distribution) rows, and
/// the loss is averaged over the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let nrows = y_pred.nrows();
        if nrows == 0 {
            return 0.0;
        }

        let mut total = 0.0;
        Zip::from(y_pred.rows()).and(y.rows()).for_each(|logits, target| {
            let max = logits.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            let log_sum = logits.mapv(|v| (v - max).exp()).sum().ln() + max;

            total -= Zip::from(&logits)
                .and(&target)
                .fold(0.0, |acc, &z, &t| acc + t * (z - log_sum));
        });

        total / nrows as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let nrows = y_pred.nrows().max(1) as f32;
        (softmax(y_pred) - &y) / nrows
    }
}
