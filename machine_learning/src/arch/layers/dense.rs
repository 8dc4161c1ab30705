use ndarray::prelude::*;
use rand::Rng;

use crate::{MlErr, Result, arch::activations::ActFn, initialization};

/// A fully connected layer. Its parameters are laid out as the `dim.0 x dim.1` weight matrix
/// in row major order followed by the `dim.1` biases.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs of the layer.
    /// * `act_fn` - The activation applied to the output, if any.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: None,
            z: Array2::zeros((0, dim.1)),
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the amount of inputs and outputs of this layer.
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Fills the layer's parameter slice using Xavier uniform weights and zero biases.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `params` - This layer's slice of parameters.
    pub fn init_params<R: Rng + ?Sized>(&self, rng: &mut R, params: &mut [f32]) -> Result<()> {
        self.check_len("layer parameters", params.len())?;

        let (w, b) = params.split_at_mut(self.size - self.dim.1);
        initialization::xavier_uniform(rng, self.dim.0, self.dim.1, w)?;
        b.fill(0.);
        Ok(())
    }

    /// Makes a forward pass through the layer, keeping the input and the weighted sums for
    /// the backward pass.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `x` - The input batch.
    ///
    /// # Returns
    /// The layer's activations.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let z = self.weighted_sum(params, x)?;
        let a = self.activate(&z);

        self.x = Some(x.to_owned());
        self.z = z;
        Ok(a)
    }

    /// Makes a forward pass through the layer without keeping any metadata.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `x` - The input batch.
    ///
    /// # Returns
    /// The layer's activations.
    pub fn infer(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let z = self.weighted_sum(params, x)?;
        Ok(self.activate(&z))
    }

    /// Backpropagates `d` through the layer, accumulating the weights and biases gradient.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `grad` - This layer's slice of the gradient.
    /// * `d` - The gradient of the loss with respect to this layer's activations.
    ///
    /// # Returns
    /// The gradient of the loss with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let x = self.x.as_ref().ok_or(MlErr::BackwardBeforeForward)?;

        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "layer output gradient",
                got: d.len(),
                expected: self.z.len(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (w, _) = self.view_params(params)?;
        let (mut dw, mut db) = self.view_grad(grad)?;
        dw += &x.t().dot(&d);
        db += &d.sum_axis(Axis(0));

        Ok(d.dot(&w.t()))
    }

    fn weighted_sum(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "layer input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        Ok(x.dot(&w) + &b)
    }

    fn activate(&self, z: &Array2<f32>) -> Array2<f32> {
        match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        }
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("layer gradient", grad.len())?;

        let (dw_raw, db_raw) = grad.split_at_mut(self.size - self.dim.1);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| self.shape_err())?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(|_| self.shape_err())?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("layer parameters", params.len())?;

        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let w = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| self.shape_err())?;
        let b = ArrayView1::from_shape(self.dim.1, b_raw).map_err(|_| self.shape_err())?;
        Ok((w, b))
    }

    fn shape_err(&self) -> MlErr {
        MlErr::SizeMismatch {
            what: "layer shape",
            got: self.size,
            expected: (self.dim.0 + 1) * self.dim.1,
        }
    }
}
