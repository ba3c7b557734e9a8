//! JSON specifications of analysis jobs and the builder turning them into runtime types.

mod builder;
mod job;
mod model;
mod rules;

pub use builder::{Job, SpecBuilder};
pub use job::{ExplanationSpec, JobSpec, NeuronSpec};
pub use model::{ActFnSpec, LayerSpec, MergeSpec, ModelSpec, TensorSpec};
pub use rules::{CompositeSpec, LayerGroupSpec, LayerTypeSpec, PrimitiveSpec, RuleSpec, TypeMapEntrySpec};
