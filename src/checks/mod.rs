//! Structural validation of a model before any relevance is propagated through it.

mod registry;
mod table;

use log::warn;

pub use registry::{register_activation_supported, register_layer_supported, Registry};
use table::Row;

use crate::{
    arch::{fmt_position, Chain, Merge, Node},
    LrpErr, Result,
};

/// Runs every compatibility check on `chain`.
///
/// In order: the model output must not be normalized into probabilities, every parallel block
/// must be merged by a sum, and every layer and embedded activation must be supported by
/// `registry`. With `verbose`, a failing layer or activation check carries a table of every
/// layer and its status.
pub fn check_model(chain: &Chain, registry: &Registry, verbose: bool) -> Result<()> {
    check_output(chain)?;
    check_merges(chain.nodes())?;
    check_layers(chain, registry, verbose)
}

/// Fails if one of the layers producing the model output ends in a softmax-like function.
pub fn check_output(chain: &Chain) -> Result<()> {
    for (_, layer) in chain.last_layers() {
        if let Some(act_fn) = layer.output_fn().filter(|f| f.is_normalizing()) {
            return Err(LrpErr::SoftmaxOutput {
                activation: act_fn.name().to_string(),
            });
        }
    }

    Ok(())
}

fn check_merges(nodes: &[Node]) -> Result<()> {
    for node in nodes {
        match node {
            Node::Layer(_) => {}
            Node::Chain(c) => check_merges(c.nodes())?,
            Node::Parallel(p) => {
                if let merge @ Merge::Concat { .. } = p.merge() {
                    return Err(LrpErr::UnsupportedMerge {
                        merge: format!("{merge:?}"),
                    });
                }
                check_merges(p.branches())?;
            }
        }
    }

    Ok(())
}

fn check_layers(chain: &Chain, registry: &Registry, verbose: bool) -> Result<()> {
    let rows: Vec<Row> = chain
        .leaves()
        .into_iter()
        .map(|(path, layer)| Row {
            position: fmt_position(&path),
            layer: format!("{layer:?}"),
            layer_ok: registry.supports_layer(layer),
            act_fn: layer.act_fn().map(|f| f.name().to_string()),
            act_fn_ok: layer
                .act_fn()
                .is_none_or(|f| registry.supports_activation(f)),
        })
        .collect();

    let bad_layer = rows.iter().find(|r| !r.layer_ok);
    let bad_act_fn = rows.iter().find(|r| !r.act_fn_ok);
    if bad_layer.is_none() && bad_act_fn.is_none() {
        return Ok(());
    }

    let table = verbose.then(|| table::render(&rows));
    if let Some(table) = &table {
        warn!("model failed the LRP compatibility checks:\n{table}");
    }

    match (bad_layer, bad_act_fn) {
        (Some(row), _) => Err(LrpErr::UnknownLayer {
            position: row.position.clone(),
            layer: row.layer.clone(),
            table,
        }),
        (None, Some(row)) => Err(LrpErr::UnknownActivation {
            position: row.position.clone(),
            activation: row.act_fn.clone().unwrap_or_default(),
            table,
        }),
        (None, None) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use super::*;
    use crate::arch::{
        activations::ActFn,
        layers::{Dense, Layer, LayerType},
        Parallel,
    };

    fn dense(act_fn: ActFn) -> Layer {
        Layer::dense(Dense::new(Array2::ones((2, 2)), Array1::zeros(2), Some(act_fn)).unwrap())
    }

    #[test]
    fn relu_models_pass() {
        let chain = Chain::new([dense(ActFn::Relu), Layer::Dropout(0.5), dense(ActFn::Identity)]);

        assert!(check_model(&chain, &Registry::new(), true).is_ok());
    }

    #[test]
    fn unknown_function_passes_once_registered() {
        let chain = Chain::new([dense(ActFn::Relu), Layer::function(ActFn::Tanh), dense(ActFn::Identity)]);
        let mut registry = Registry::new();

        let err = check_model(&chain, &registry, true).unwrap_err();
        let LrpErr::UnknownLayer { position, table, .. } = err else {
            panic!("expected an unknown layer error, got {err}");
        };
        assert_eq!(position, "2");
        assert!(table.is_some_and(|t| t.contains("tanh")));

        registry.register_layer(LayerType::function("tanh"));
        assert!(check_model(&chain, &registry, true).is_ok());
    }

    #[test]
    fn unknown_activation_is_told_apart() {
        let chain = Chain::new([dense(ActFn::Sigmoid), dense(ActFn::Identity)]);

        let err = check_model(&chain, &Registry::new(), false).unwrap_err();

        assert!(matches!(err, LrpErr::UnknownActivation { table: None, .. }));
    }

    #[test]
    fn softmax_output_is_rejected() {
        let embedded = Chain::new([dense(ActFn::Relu), dense(ActFn::Softmax)]);
        let function = Chain::new([dense(ActFn::Relu), Layer::function(ActFn::Softmax)]);

        for chain in [embedded, function] {
            let err = check_model(&chain, &Registry::new(), true).unwrap_err();
            assert!(matches!(err, LrpErr::SoftmaxOutput { .. }));
        }
    }

    #[test]
    fn concatenation_cannot_be_split() {
        let parallel = Parallel::new(Merge::Concat { axis: 1 }, [dense(ActFn::Relu), dense(ActFn::Relu)]).unwrap();
        let chain = Chain::new([Node::from(parallel)]);

        let err = check_model(&chain, &Registry::new(), true).unwrap_err();

        assert!(matches!(err, LrpErr::UnsupportedMerge { .. }));
    }
}
