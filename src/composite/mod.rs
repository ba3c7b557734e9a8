mod presets;
mod primitive;
mod resolve;
mod type_map;

pub use primitive::Primitive;
pub use resolve::Composite;
pub use type_map::{TypeMap, TypeMatch};
