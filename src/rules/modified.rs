use super::{Rule, Rules};
use crate::{
    arch::{
        fmt_position,
        layers::{Layer, Params},
        Chain, Node,
    },
    LrpErr, Result,
};

/// The layer a rule actually propagates through, computed once per analyzer.
#[derive(Clone, Debug)]
pub(crate) enum ModifiedLayer {
    /// Propagated with the generic rule.
    Generic(Layer),
    ZBox {
        layer: Layer,
        pos: Layer,
        neg: Layer,
    },
    /// Positive and negative halves of the parameters, with and without their bias.
    AlphaBeta {
        pos: Layer,
        neg: Layer,
        pos_nobias: Layer,
        neg_nobias: Layer,
    },
    Pass,
}

impl ModifiedLayer {
    pub(crate) fn new(rule: &Rule, layer: &Layer, path: &[usize]) -> Result<Self> {
        rule.validate()?;
        if !rule.is_compatible(layer) {
            return Err(LrpErr::IncompatibleRule {
                position: fmt_position(path),
                rule: rule.name(),
                layer: format!("{layer:?}"),
            });
        }

        match rule {
            Rule::Pass => Ok(ModifiedLayer::Pass),
            Rule::ZBox { .. } => {
                let params = affine_params(layer)?;
                Ok(ModifiedLayer::ZBox {
                    layer: layer.linear()?,
                    pos: layer.with_params(params.map(|p| p.max(0.)).without_bias())?,
                    neg: layer.with_params(params.map(|p| p.min(0.)).without_bias())?,
                })
            }
            Rule::AlphaBeta { .. } => {
                let pos = affine_params(layer)?.map(|p| p.max(0.));
                let neg = affine_params(layer)?.map(|p| p.min(0.));
                Ok(ModifiedLayer::AlphaBeta {
                    pos: layer.with_params(pos.clone())?,
                    neg: layer.with_params(neg.clone())?,
                    pos_nobias: layer.with_params(pos.without_bias())?,
                    neg_nobias: layer.with_params(neg.without_bias())?,
                })
            }
            rule => match (rule.modify_layer(layer), layer.params()) {
                (Some(modified), params) => {
                    if let (Rule::Custom(custom), Some(params)) = (rule, params) {
                        if custom.modify_parameters(&params).is_some() {
                            return Err(LrpErr::ConflictingModification {
                                position: fmt_position(path),
                                rule: rule.name(),
                            });
                        }
                    }
                    Ok(ModifiedLayer::Generic(modified))
                }
                (None, Some(params)) => Ok(ModifiedLayer::Generic(
                    layer.with_params(rule.modify_parameters(params))?,
                )),
                (None, None) => Ok(ModifiedLayer::Generic(layer.clone())),
            },
        }
    }
}

fn affine_params(layer: &Layer) -> Result<Params> {
    layer
        .params()
        .ok_or_else(|| LrpErr::shape("affine parameters", &[], "a layer with weights"))
}

/// Modified layers nested like the model.
#[derive(Clone, Debug)]
pub(crate) enum Modified {
    Layer(Rule, ModifiedLayer),
    Chain(Vec<Modified>),
    Parallel(Vec<Modified>),
}

impl Modified {
    /// Pairs every layer of `chain` with its rule, failing if `rules` isn't shaped like `chain`.
    pub(crate) fn build(chain: &Chain, rules: &Rules) -> Result<Vec<Modified>> {
        build_chain(chain, rules, &mut Vec::new())
    }
}

fn build_chain(chain: &Chain, rules: &Rules, path: &mut Vec<usize>) -> Result<Vec<Modified>> {
    let Rules::Chain(rules) = rules else {
        return Err(Rules::mismatch(path));
    };
    if rules.len() != chain.len() {
        return Err(Rules::mismatch(path));
    }

    let mut out = Vec::with_capacity(chain.len());
    for (i, (node, rules)) in chain.nodes().iter().zip(rules).enumerate() {
        path.push(i + 1);
        out.push(build_node(node, rules, path)?);
        path.pop();
    }

    Ok(out)
}

fn build_node(node: &Node, rules: &Rules, path: &mut Vec<usize>) -> Result<Modified> {
    match (node, rules) {
        (Node::Layer(layer), Rules::Rule(rule)) => {
            Ok(Modified::Layer(rule.clone(), ModifiedLayer::new(rule, layer, path)?))
        }
        (Node::Chain(chain), rules @ Rules::Chain(_)) => {
            Ok(Modified::Chain(build_chain(chain, rules, path)?))
        }
        (Node::Parallel(parallel), Rules::Parallel(rules))
            if rules.len() == parallel.branches().len() =>
        {
            let mut out = Vec::with_capacity(rules.len());
            for (b, (branch, rules)) in parallel.branches().iter().zip(rules).enumerate() {
                path.push(b + 1);
                out.push(build_node(branch, rules, path)?);
                path.pop();
            }
            Ok(Modified::Parallel(out))
        }
        _ => Err(Rules::mismatch(path)),
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use super::*;
    use crate::{
        arch::{activations::ActFn, layers::Dense},
        rules::CustomRule,
    };

    fn dense() -> Layer {
        Layer::dense(Dense::new(Array2::ones((2, 2)), Array1::ones(2), Some(ActFn::Relu)).unwrap())
    }

    struct Greedy;

    impl CustomRule for Greedy {
        fn name(&self) -> &str {
            "Greedy"
        }

        fn modify_parameters(&self, params: &Params) -> Option<Params> {
            Some(params.map(|p| p * 2.))
        }

        fn modify_layer(&self, layer: &Layer) -> Option<Layer> {
            Some(layer.clone())
        }
    }

    #[test]
    fn conflicting_custom_rule_is_rejected() {
        let err = ModifiedLayer::new(&Rule::custom(Greedy), &dense(), &[1]).unwrap_err();

        assert!(matches!(err, LrpErr::ConflictingModification { .. }));
    }

    #[test]
    fn parameter_rules_need_parameters() {
        let err = ModifiedLayer::new(&Rule::gamma(0.25), &Layer::Flatten, &[3]).unwrap_err();

        assert!(matches!(err, LrpErr::IncompatibleRule { .. }));
    }

    #[test]
    fn rules_must_mirror_the_model() {
        let chain = Chain::new([dense(), dense()]);

        assert!(Modified::build(&chain, &Rules::chain([Rule::Zero])).is_err());
        assert!(Modified::build(&chain, &Rules::chain([Rule::Zero, Rule::Zero])).is_ok());
    }
}
