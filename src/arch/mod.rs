pub mod activations;
mod chain;
pub mod layers;

pub use chain::{fmt_position, Chain, Merge, Node, Parallel};
