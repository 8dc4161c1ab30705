mod act_fn;
mod sigmoid;
mod softmax;

pub use act_fn::ActFn;
pub use sigmoid::Sigmoid;
pub use softmax::softmax;
