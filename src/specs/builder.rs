use ndarray::{Array1, Array2, Array4, ArrayD, IxDyn};

use super::{
    ActFnSpec, CompositeSpec, JobSpec, LayerGroupSpec, LayerSpec, LayerTypeSpec, MergeSpec, ModelSpec, NeuronSpec,
    PrimitiveSpec, RuleSpec, TensorSpec, TypeMapEntrySpec,
};
use crate::{
    analyzer::Lrp,
    arch::{
        activations::ActFn,
        layers::{Conv, Dense, Layer, LayerGroup, LayerType},
        Chain, Merge, Node, Parallel,
    },
    checks::Registry,
    composite::{Composite, Primitive, TypeMap, TypeMatch},
    explanation::Explanation,
    rules::Rule,
    selector::{Index, MaxActivation, NeuronSelector},
    LrpErr, Result,
};

/// An analysis ready to run.
pub struct Job {
    pub analyzer: Lrp,
    pub input: ArrayD<f32>,
    pub selector: Box<dyn NeuronSelector>,
    pub layerwise_relevances: bool,
}

impl Job {
    pub fn run(&self) -> Result<Explanation> {
        self.analyzer
            .analyze(self.input.view(), self.selector.as_ref(), self.layerwise_relevances)
    }
}

/// Builds runtime types given a specification.
#[derive(Default)]
pub struct SpecBuilder {
    registry: Option<Registry>,
}

impl SpecBuilder {
    /// Creates a new `SpecBuilder` that checks models against the process-wide registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks models against `registry` instead of the process-wide one.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// Builds a new `Job` following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification for the job.
    pub fn build(&self, spec: &JobSpec) -> Result<Job> {
        let model = self.resolve_model(&spec.model)?;
        let composite = self.resolve_composite(&spec.composite)?;
        let registry = self.registry.clone().unwrap_or_else(Registry::global);
        let analyzer = Lrp::with_registry(model, composite, spec.options, &registry)?;

        Ok(Job {
            analyzer,
            input: self.resolve_tensor(&spec.input)?,
            selector: self.resolve_selector(spec.neuron),
            layerwise_relevances: spec.layerwise_relevances,
        })
    }

    pub fn resolve_model(&self, spec: &ModelSpec) -> Result<Chain> {
        match spec {
            ModelSpec::Chain { layers } => self.resolve_chain(layers),
        }
    }

    fn resolve_chain(&self, specs: &[LayerSpec]) -> Result<Chain> {
        let nodes = specs
            .iter()
            .map(|spec| self.resolve_node(spec))
            .collect::<Result<Vec<_>>>()?;

        Ok(Chain::new(nodes))
    }

    fn resolve_node(&self, spec: &LayerSpec) -> Result<Node> {
        let layer = match spec {
            LayerSpec::Dense {
                weight,
                bias,
                act_fn,
            } => {
                let weight: Array2<f32> = self
                    .resolve_tensor(weight)?
                    .into_dimensionality()
                    .map_err(|_| LrpErr::shape("dense weight", &weight.shape, "a rank 2 tensor"))?;
                Layer::dense(Dense::new(weight, Array1::from(bias.clone()), self.resolve_act_fn(*act_fn))?)
            }
            LayerSpec::Conv {
                weight,
                bias,
                stride,
                padding,
                act_fn,
            } => {
                let weight: Array4<f32> = self
                    .resolve_tensor(weight)?
                    .into_dimensionality()
                    .map_err(|_| LrpErr::shape("conv weight", &weight.shape, "a rank 4 tensor"))?;
                Layer::conv(Conv::new(
                    weight,
                    Array1::from(bias.clone()),
                    *stride,
                    *padding,
                    self.resolve_act_fn(*act_fn),
                )?)
            }
            LayerSpec::MaxPool { window, stride } => Layer::max_pool(*window, *stride)?,
            LayerSpec::MeanPool { window, stride } => Layer::mean_pool(*window, *stride)?,
            LayerSpec::Flatten => Layer::Flatten,
            LayerSpec::Reshape { shape } => Layer::Reshape(shape.clone()),
            LayerSpec::Dropout { p } => Layer::Dropout(*p),
            LayerSpec::Function { act_fn } => Layer::function(self.resolve_act_fn_spec(*act_fn)),
            LayerSpec::Chain { layers } => return Ok(Node::Chain(self.resolve_chain(layers)?)),
            LayerSpec::Parallel { merge, branches } => {
                let merge = match *merge {
                    MergeSpec::Sum => Merge::Sum,
                    MergeSpec::Concat { axis } => Merge::Concat { axis },
                };
                let branches = branches
                    .iter()
                    .map(|spec| self.resolve_node(spec))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Node::Parallel(Parallel::new(merge, branches)?));
            }
        };

        Ok(Node::Layer(layer))
    }

    fn resolve_act_fn(&self, spec: Option<ActFnSpec>) -> Option<ActFn> {
        spec.map(|spec| self.resolve_act_fn_spec(spec))
    }

    fn resolve_act_fn_spec(&self, spec: ActFnSpec) -> ActFn {
        match spec {
            ActFnSpec::Identity => ActFn::Identity,
            ActFnSpec::Relu => ActFn::Relu,
            ActFnSpec::LeakyRelu { slope } => ActFn::leaky_relu(slope),
            ActFnSpec::Relu6 => ActFn::Relu6,
            ActFnSpec::Sigmoid => ActFn::Sigmoid,
            ActFnSpec::Tanh => ActFn::Tanh,
            ActFnSpec::Softmax => ActFn::Softmax,
        }
    }

    pub fn resolve_composite(&self, spec: &CompositeSpec) -> Result<Composite> {
        let composite = match spec {
            CompositeSpec::Uniform { rule } => Composite::new([Primitive::GlobalMap(self.resolve_rule(*rule))]),
            CompositeSpec::EpsilonGammaBox { low, high } => Composite::epsilon_gamma_box(*low, *high),
            CompositeSpec::EpsilonPlus => Composite::epsilon_plus(),
            CompositeSpec::EpsilonAlpha2Beta1 => Composite::epsilon_alpha2_beta1(),
            CompositeSpec::EpsilonPlusFlat => Composite::epsilon_plus_flat(),
            CompositeSpec::EpsilonAlpha2Beta1Flat => Composite::epsilon_alpha2_beta1_flat(),
            CompositeSpec::Primitives { primitives } => Composite::new(
                primitives
                    .iter()
                    .map(|p| self.resolve_primitive(p))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        Ok(composite)
    }

    fn resolve_primitive(&self, spec: &PrimitiveSpec) -> Result<Primitive> {
        let rule = |spec: &RuleSpec| self.resolve_rule(*spec);

        let primitive = match spec {
            PrimitiveSpec::LayerMap { index, rule: r } => Primitive::LayerMap {
                index: *index,
                rule: rule(r),
            },
            PrimitiveSpec::GlobalMap { rule: r } => Primitive::GlobalMap(rule(r)),
            PrimitiveSpec::RangeMap { range, rule: r } => Primitive::RangeMap {
                range: range.0..=range.1,
                rule: rule(r),
            },
            PrimitiveSpec::FirstLayerMap { rule: r } => Primitive::FirstLayerMap(rule(r)),
            PrimitiveSpec::LastLayerMap { rule: r } => Primitive::LastLayerMap(rule(r)),
            PrimitiveSpec::GlobalTypeMap { map } => Primitive::GlobalTypeMap(self.resolve_type_map(map)?),
            PrimitiveSpec::RangeTypeMap { range, map } => Primitive::RangeTypeMap {
                range: range.0..=range.1,
                map: self.resolve_type_map(map)?,
            },
            PrimitiveSpec::FirstLayerTypeMap { map } => Primitive::FirstLayerTypeMap(self.resolve_type_map(map)?),
            PrimitiveSpec::LastLayerTypeMap { map } => Primitive::LastLayerTypeMap(self.resolve_type_map(map)?),
            PrimitiveSpec::FirstNTypeMap { n, map } => Primitive::FirstNTypeMap {
                n: *n,
                map: self.resolve_type_map(map)?,
            },
        };

        Ok(primitive)
    }

    fn resolve_type_map(&self, entries: &[TypeMapEntrySpec]) -> Result<TypeMap> {
        entries
            .iter()
            .map(|entry| {
                let matcher = match (&entry.layer, entry.group) {
                    (Some(layer), None) => TypeMatch::Type(self.resolve_layer_type(layer)),
                    (None, Some(group)) => TypeMatch::Group(self.resolve_layer_group(group)),
                    _ => {
                        return Err(LrpErr::InvalidRule {
                            rule: "type map",
                            reason: "every entry needs exactly one of `layer` and `group`".to_string(),
                        })
                    }
                };
                Ok((matcher, self.resolve_rule(entry.rule)))
            })
            .collect()
    }

    fn resolve_layer_type(&self, spec: &LayerTypeSpec) -> LayerType {
        match spec {
            LayerTypeSpec::Dense => LayerType::Dense,
            LayerTypeSpec::Conv => LayerType::Conv,
            LayerTypeSpec::MaxPool => LayerType::MaxPool,
            LayerTypeSpec::MeanPool => LayerType::MeanPool,
            LayerTypeSpec::Flatten => LayerType::Flatten,
            LayerTypeSpec::Reshape => LayerType::Reshape,
            LayerTypeSpec::Dropout => LayerType::Dropout,
            LayerTypeSpec::Function { name } => LayerType::function(name.as_str()),
            LayerTypeSpec::Custom { name } => LayerType::custom(name.as_str()),
        }
    }

    fn resolve_layer_group(&self, spec: LayerGroupSpec) -> LayerGroup {
        match spec {
            LayerGroupSpec::Affine => LayerGroup::Affine,
            LayerGroupSpec::Convolution => LayerGroup::Convolution,
            LayerGroupSpec::Pooling => LayerGroup::Pooling,
            LayerGroupSpec::Reshaping => LayerGroup::Reshaping,
            LayerGroupSpec::Dropout => LayerGroup::Dropout,
            LayerGroupSpec::Function => LayerGroup::Function,
        }
    }

    pub fn resolve_rule(&self, spec: RuleSpec) -> Rule {
        match spec {
            RuleSpec::Zero => Rule::Zero,
            RuleSpec::Epsilon { epsilon } => Rule::epsilon(epsilon),
            RuleSpec::Gamma { gamma } => Rule::gamma(gamma),
            RuleSpec::WSquare => Rule::WSquare,
            RuleSpec::Flat => Rule::Flat,
            RuleSpec::ZBox { low, high } => Rule::zbox(low, high),
            RuleSpec::ZPlus => Rule::ZPlus,
            RuleSpec::AlphaBeta { alpha, beta } => Rule::alpha_beta(alpha, beta),
            RuleSpec::Pass => Rule::Pass,
        }
    }

    fn resolve_selector(&self, spec: NeuronSpec) -> Box<dyn NeuronSelector> {
        match spec {
            NeuronSpec::MaxActivation => Box::new(MaxActivation),
            NeuronSpec::Index { index } => Box::new(Index(index)),
        }
    }

    pub fn resolve_tensor(&self, spec: &TensorSpec) -> Result<ArrayD<f32>> {
        ArrayD::from_shape_vec(IxDyn(&spec.shape), spec.data.clone()).map_err(|_| {
            LrpErr::shape(
                "tensor data",
                &spec.shape,
                format!("{} values to match the shape", spec.data.len()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"{
        "model": { "chain": { "layers": [
            { "dense": {
                "weight": { "shape": [2, 2], "data": [1.0, -1.0, 0.5, 2.0] },
                "bias": [0.0, 0.0],
                "act_fn": "relu"
            } },
            { "chain": { "layers": [
                { "dense": {
                    "weight": { "shape": [2, 1], "data": [1.0, 1.0] },
                    "bias": [0.0],
                    "act_fn": null
                } }
            ] } }
        ] } },
        "composite": { "primitives": { "primitives": [
            { "global_type_map": { "map": [
                { "group": "affine", "rule": { "epsilon": {} } }
            ] } },
            { "first_layer_map": { "rule": "z_plus" } }
        ] } },
        "input": { "shape": [1, 2], "data": [1.0, 2.0] },
        "layerwise_relevances": true
    }"#;

    #[test]
    fn builds_and_runs_a_job() {
        let spec: JobSpec = serde_json::from_str(JOB).unwrap();
        let job = SpecBuilder::with_registry(Registry::new()).build(&spec).unwrap();

        let names: Vec<String> = job.analyzer.rules().leaves().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["ZPlusRule", "EpsilonRule(1e-6)"]);

        let expl = job.run().unwrap();
        assert_eq!(expl.val.shape(), &[1, 2]);
        assert_eq!(expl.extras.layerwise_relevances.map(|r| r.len()), Some(3));
    }

    #[test]
    fn mismatched_tensor_data_is_rejected() {
        let spec = TensorSpec {
            shape: vec![2, 3],
            data: vec![0.0; 5],
        };

        let err = SpecBuilder::new().resolve_tensor(&spec).unwrap_err();

        assert!(matches!(err, LrpErr::ShapeMismatch { .. }));
    }
}
