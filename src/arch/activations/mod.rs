mod act_fn;
mod custom;

pub use act_fn::ActFn;
pub use custom::CustomActivation;
