use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A trainable model whose parameters and gradients live in flat buffers.
///
/// A training step is a `forward` followed by one or more `backward` calls, each one
/// accumulating into the gradient buffer until `zero_grad` is called.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Makes a forward pass through the model, keeping whatever `backward` needs.
    ///
    /// # Arguments
    /// * `x` - The input batch, one sample per row.
    ///
    /// # Returns
    /// The model's output for the given batch or an error if the shapes don't match.
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Makes a forward pass without touching any of the backward metadata.
    ///
    /// # Arguments
    /// * `x` - The input batch, one sample per row.
    ///
    /// # Returns
    /// The model's output for the given batch or an error if the shapes don't match.
    fn infer(&self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Backpropagates the gradient of the loss with respect to the output of the last
    /// `forward` call. The parameter gradients are **accumulated** into the gradient buffer.
    ///
    /// # Arguments
    /// * `d` - The gradient of the loss with respect to the model's output.
    ///
    /// # Returns
    /// The gradient of the loss with respect to the model's input.
    fn backward(&mut self, d: Array2<f32>) -> Result<Array2<f32>>;

    /// Resets the accumulated gradient to zero.
    fn zero_grad(&mut self);

    /// Returns the model's flat parameter buffer.
    fn params(&self) -> &[f32];

    /// Returns the parameters for updating them alongside the accumulated gradient.
    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]);

    /// Overwrites every parameter of the model.
    ///
    /// # Arguments
    /// * `params` - The new parameters, must be exactly `size()` long.
    fn load_params(&mut self, params: &[f32]) -> Result<()>;
}
