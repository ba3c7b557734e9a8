mod laws;
mod options;
mod propagate;

use log::info;
use ndarray::{ArrayD, ArrayViewD, Axis};

pub use options::LrpOptions;

use crate::{
    arch::Chain,
    checks::{check_model, Registry},
    composite::{Composite, Primitive},
    explanation::{Explanation, Extras, Method},
    rules::{Modified, Rule, Rules},
    selector::{select_per_sample, NeuronSelector},
    LrpErr, Result,
};

/// Where the rules of an analyzer come from.
#[derive(Clone, Debug)]
pub enum RuleSource {
    Composite(Composite),
    /// One rule per layer, nested like the model.
    Rules(Rules),
}

impl From<Composite> for RuleSource {
    fn from(composite: Composite) -> Self {
        RuleSource::Composite(composite)
    }
}

impl From<Rules> for RuleSource {
    fn from(rules: Rules) -> Self {
        RuleSource::Rules(rules)
    }
}

/// The same rule on every layer.
impl From<Rule> for RuleSource {
    fn from(rule: Rule) -> Self {
        RuleSource::Composite(Composite::new([Primitive::GlobalMap(rule)]))
    }
}

/// A layer-wise relevance propagation analyzer.
///
/// Every configuration problem (unsupported layers, a softmax output, layers left without a rule,
/// rules that can't be applied to their layer) is reported when the analyzer is built, so that
/// [`Lrp::analyze`] can only fail on inputs of the wrong shape.
#[derive(Clone, Debug)]
pub struct Lrp {
    model: Chain,
    rules: Rules,
    modified: Vec<Modified>,
}

impl Lrp {
    /// Creates a new `Lrp` analyzer, checking the model against the process-wide registry.
    ///
    /// # Arguments
    /// * `model` - The model to explain.
    /// * `rules` - A composite, an explicit rule assignment or a single rule for every layer.
    /// * `options` - See [`LrpOptions`].
    pub fn new<R>(model: Chain, rules: R, options: LrpOptions) -> Result<Self>
    where
        R: Into<RuleSource>,
    {
        Self::with_registry(model, rules, options, &Registry::global())
    }

    /// Like [`Lrp::new`], checking the model against `registry` instead.
    pub fn with_registry<R>(model: Chain, rules: R, options: LrpOptions, registry: &Registry) -> Result<Self>
    where
        R: Into<RuleSource>,
    {
        let rules = rules.into();
        let model = if options.flatten { model.flatten() } else { model };
        if !options.skip_checks {
            check_model(&model, registry, options.verbose)?;
        }

        let rules = match rules {
            RuleSource::Composite(composite) => composite.rules(&model)?,
            RuleSource::Rules(rules) if options.flatten => rules.flatten(),
            RuleSource::Rules(rules) => rules,
        };
        let modified = Modified::build(&model, &rules)?;

        info!(
            "built LRP analyzer over {} layers at {} top-level positions",
            model.leaf_count(),
            model.len()
        );

        Ok(Self {
            model,
            rules,
            modified,
        })
    }

    pub fn model(&self) -> &Chain {
        &self.model
    }

    /// The resolved rule of every layer.
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Explains the output neuron picked by `selector` for every sample of `input`.
    ///
    /// With `layerwise_relevances`, the returned explanation also carries the relevance at the
    /// input and at the output of every top-level position.
    ///
    /// # Errors
    /// `ShapeMismatch` if the input doesn't fit the model or the output lost the batch axis,
    /// `InvalidNeuron` if the selector picks a neuron outside the output.
    pub fn analyze<S>(&self, input: ArrayViewD<f32>, selector: &S, layerwise_relevances: bool) -> Result<Explanation>
    where
        S: NeuronSelector + ?Sized,
    {
        if input.ndim() < 2 {
            return Err(LrpErr::shape("model input", input.shape(), "a batch axis and at least one feature axis"));
        }

        let acts = self.model.activations(input.view())?;
        let output = acts.last().cloned().unwrap_or_default();
        if output.shape().first() != input.shape().first() {
            return Err(LrpErr::shape("model output", output.shape(), "a leading batch axis"));
        }
        let selected = select_per_sample(selector, output.view())?;
        let seed = one_hot(&output, &selected);

        let rels = propagate::sweep(self.model.nodes(), &self.modified, &acts, seed, &mut Vec::new())?;
        let val = rels.first().cloned().unwrap_or_default();

        Ok(Explanation {
            val,
            output,
            selected,
            method: Method::Lrp,
            extras: Extras {
                layerwise_relevances: layerwise_relevances.then_some(rels),
            },
        })
    }
}

/// A zero array shaped like `output` with a one at the selected neuron of every sample.
fn one_hot(output: &ArrayD<f32>, selected: &[usize]) -> ArrayD<f32> {
    let mut seed = ArrayD::zeros(output.raw_dim());
    for (mut sample, &index) in seed.axis_iter_mut(Axis(0)).zip(selected) {
        if let Some(v) = sample.iter_mut().nth(index) {
            *v = 1.;
        }
    }

    seed
}

#[cfg(test)]
mod tests {
    use ndarray::{arr2, Array1, Array2};

    use super::*;
    use crate::{
        arch::{
            activations::ActFn,
            layers::{Dense, Layer},
            Merge, Node, Parallel,
        },
        selector::{Index, MaxActivation},
    };

    fn dense(weight: Array2<f32>, act_fn: Option<ActFn>) -> Layer {
        let out = weight.ncols();
        Layer::dense(Dense::new(weight, Array1::zeros(out), act_fn).unwrap())
    }

    fn model() -> Chain {
        Chain::new([
            dense(arr2(&[[1.0, -1.0, 0.5], [0.5, 2.0, -1.0]]), Some(ActFn::Relu)),
            dense(arr2(&[[1.0, 0.0], [0.5, 1.0], [-1.0, 2.0]]), None),
        ])
    }

    #[test]
    fn zero_rule_conserves_the_seed() {
        let lrp = Lrp::with_registry(model(), Rule::Zero, LrpOptions::default(), &Registry::new()).unwrap();
        let x = arr2(&[[1.0, 2.0]]).into_dyn();

        let expl = lrp.analyze(x.view(), &MaxActivation, false).unwrap();

        assert_eq!(expl.val.shape(), &[1, 2]);
        assert!((expl.val.sum() - 1.0).abs() < 1e-4);
        assert!(expl.extras.layerwise_relevances.is_none());
    }

    #[test]
    fn seed_is_one_hot_per_sample() {
        let output = arr2(&[[0.5, 3.0], [-1.0, 0.0]]).into_dyn();

        let seed = one_hot(&output, &[1, 0]);

        assert_eq!(seed, arr2(&[[0.0, 1.0], [1.0, 0.0]]).into_dyn());
    }

    #[test]
    fn layerwise_relevances_start_at_the_input_and_end_at_the_seed() {
        let lrp = Lrp::with_registry(model(), Rule::epsilon(1e-6), LrpOptions::default(), &Registry::new()).unwrap();
        let x = arr2(&[[1.0, 2.0], [0.5, -1.0]]).into_dyn();

        let expl = lrp.analyze(x.view(), &Index(1), true).unwrap();
        let rels = expl.extras.layerwise_relevances.unwrap();

        assert_eq!(rels.len(), 3);
        assert_eq!(rels[0], expl.val);
        assert_eq!(rels[2], one_hot(&expl.output, &expl.selected));
        assert_eq!(expl.selected, vec![1, 1]);
    }

    #[test]
    fn sum_parallel_blocks_split_relevance() {
        let parallel = Parallel::new(
            Merge::Sum,
            [
                dense(arr2(&[[1.0, 0.0], [0.0, 1.0]]), None),
                dense(arr2(&[[2.0, 1.0], [1.0, 0.0]]), None),
            ],
        )
        .unwrap();
        let chain = Chain::new([Node::from(parallel), dense(arr2(&[[1.0], [1.0]]), None).into()]);
        let lrp = Lrp::with_registry(chain, Rule::Zero, LrpOptions::default(), &Registry::new()).unwrap();
        let x = arr2(&[[1.0, 1.0]]).into_dyn();

        let expl = lrp.analyze(x.view(), &MaxActivation, false).unwrap();

        assert!((expl.val.sum() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rank_one_input_is_a_shape_error() {
        let lrp = Lrp::with_registry(model(), Rule::Zero, LrpOptions::default(), &Registry::new()).unwrap();
        let x = ndarray::arr1(&[1.0, 2.0]).into_dyn();

        let err = lrp.analyze(x.view(), &MaxActivation, false).unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::Shape);
    }
}
