use super::Sigmoid;

/// The element-wise activation functions a layer can apply to its output.
#[derive(Clone, Debug)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Relu,
    Tanh,
}
use ActFn::*;

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Sigmoid(Sigmoid::new(amp))
    }

    pub fn relu() -> Self {
        Relu
    }

    pub fn tanh() -> Self {
        Tanh
    }

    pub fn f(&self, z: f32) -> f32 {
        match self {
            Sigmoid(a) => a.f(z),
            Relu => z.max(0.),
            Tanh => z.tanh(),
        }
    }

    pub fn df(&self, z: f32) -> f32 {
        match self {
            Sigmoid(a) => a.df(z),
            Relu if z > 0. => 1.,
            Relu => 0.,
            Tanh => 1. - z.tanh().powi(2),
        }
    }
}
