use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{Model, layers::Layer};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// Every layer's parameters live in one flat buffer, in layer order, and so does the gradient.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl Sequential {
    /// Creates a new `Sequential` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<Layer> = layers.into_iter().collect();
        let size = layers.iter().map(|layer| layer.size()).sum();

        Self {
            layers,
            params: vec![0.; size],
            grad: vec![0.; size],
        }
    }

    /// Creates a new `Sequential` with randomly initialized parameters.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    /// * `rng` - The random number generator used to initialize the parameters.
    ///
    /// # Returns
    /// A new `Sequential` instance, or an error if consecutive layers don't fit each other or
    /// can't be initialized.
    pub fn random<I, R>(layers: I, rng: &mut R) -> Result<Self>
    where
        I: IntoIterator<Item = Layer>,
        R: Rng + ?Sized,
    {
        let mut model = Self::new(layers);
        model.validate()?;
        let mut offset = 0;

        for layer in &model.layers {
            let size = layer.size();
            layer.init_params(rng, &mut model.params[offset..offset + size])?;
            offset += size;
        }

        Ok(model)
    }

    /// Checks that the output of every layer fits the input of the next one.
    ///
    /// # Returns
    /// An error naming the first mismatching pair of layers.
    pub fn validate(&self) -> Result<()> {
        for pair in self.layers.windows(2) {
            let (_, out) = pair[0].dim();
            let (inp, _) = pair[1].dim();

            if out != inp {
                return Err(MlErr::SizeMismatch {
                    what: "consecutive layers",
                    got: inp,
                    expected: out,
                });
            }
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut offset = 0;
        let mut a = x.to_owned();

        for layer in self.layers.iter_mut() {
            let size = layer.size();
            a = layer.forward(&self.params[offset..offset + size], a.view())?;
            offset += size;
        }

        Ok(a)
    }

    fn infer(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut offset = 0;
        let mut a = x.to_owned();

        for layer in self.layers.iter() {
            let size = layer.size();
            a = layer.infer(&self.params[offset..offset + size], a.view())?;
            offset += size;
        }

        Ok(a)
    }

    fn backward(&mut self, mut d: Array2<f32>) -> Result<Array2<f32>> {
        let mut end = self.params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&self.params[start..end], &mut self.grad[start..end], d)?;
            end = start;
        }

        Ok(d)
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    fn load_params(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "model parameters",
                got: params.len(),
                expected: self.params.len(),
            });
        }

        self.params.copy_from_slice(params);
        Ok(())
    }
}
