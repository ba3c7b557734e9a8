mod conv;
mod custom;
mod dense;
mod layer;
mod pool;

pub use conv::Conv;
pub use custom::CustomLayer;
pub use dense::Dense;
pub use layer::{Layer, LayerGroup, LayerType, Params};
pub(crate) use layer::reshape;
pub use pool::{Pool, PoolKind};
