use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// RMSprop with L2 weight decay folded into the gradient.
#[derive(Debug)]
pub struct RmsProp {
    learning_rate: f32,
    weight_decay: f32,
    alpha: f32,
    epsilon: f32,
    s: Box<[f32]>,
}

impl RmsProp {
    /// Creates a new `RmsProp` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `weight_decay` - The L2 penalty added to the gradient.
    /// * `alpha` - The smoothing constant of the squared gradient average.
    /// * `epsilon` - Added to the denominator for numerical stability.
    ///
    /// # Returns
    /// A new `RmsProp` instance.
    pub fn new(
        len: usize,
        learning_rate: f32,
        weight_decay: f32,
        alpha: f32,
        epsilon: f32,
    ) -> Self {
        Self {
            learning_rate,
            weight_decay,
            alpha,
            epsilon,
            s: vec![0.; len].into_boxed_slice(),
        }
    }

    /// Creates a new `RmsProp` optimizer with `alpha = 0.99` and `epsilon = 1e-8`.
    pub fn with_defaults(len: usize, learning_rate: f32, weight_decay: f32) -> Self {
        Self::new(len, learning_rate, weight_decay, 0.99, 1e-8)
    }
}

impl Optimizer for RmsProp {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad, self.s.len())?;

        let lr = self.learning_rate;
        let wd = self.weight_decay;
        let alpha = self.alpha;
        let eps = self.epsilon;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.s.iter_mut())
            .for_each(|((p, g), s)| {
                let g = g + wd * *p;
                *s = alpha * *s + (1. - alpha) * g.powi(2);
                *p -= lr * g / (s.sqrt() + eps);
            });

        Ok(())
    }
}
