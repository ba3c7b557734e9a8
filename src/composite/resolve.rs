use log::debug;

use super::{primitive::Site, Primitive};
use crate::{
    arch::{fmt_position, Chain},
    rules::{Rule, Rules},
    LrpErr, Result,
};

/// An ordered list of primitives that assigns a rule to every layer of a model.
///
/// Primitives are applied in order and each one overwrites the positions it matches, so broad
/// defaults go first and more specific overrides after them.
#[derive(Clone, Debug, Default)]
pub struct Composite {
    primitives: Vec<Primitive>,
}

impl Composite {
    pub fn new<I>(primitives: I) -> Self
    where
        I: IntoIterator<Item = Primitive>,
    {
        Self {
            primitives: primitives.into_iter().collect(),
        }
    }

    /// Appends a primitive, applied after all the present ones.
    pub fn then(mut self, primitive: Primitive) -> Self {
        self.primitives.push(primitive);
        self
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Resolves the rule of every layer of `chain`.
    ///
    /// # Errors
    /// `UnresolvedRule` if any layer is left without a rule once every primitive was applied.
    pub fn rules(&self, chain: &Chain) -> Result<Rules> {
        let leaves = chain.leaves();
        let firsts: Vec<Vec<usize>> = chain.first_layers().into_iter().map(|(p, _)| p).collect();
        let lasts: Vec<Vec<usize>> = chain.last_layers().into_iter().map(|(p, _)| p).collect();

        let mut assigned: Vec<Option<Rule>> = vec![None; leaves.len()];
        for primitive in &self.primitives {
            let mut hits = 0;
            for ((path, layer), slot) in leaves.iter().zip(assigned.iter_mut()) {
                let site = Site {
                    path,
                    layer,
                    first: firsts.contains(path),
                    last: lasts.contains(path),
                };
                if let Some(rule) = primitive.rule_for(&site) {
                    *slot = Some(rule);
                    hits += 1;
                }
            }
            debug!("{primitive:?} matched {hits} layer(s)");
        }

        let mut assigned = assigned.into_iter();
        Rules::from_fn(chain, |path, _| {
            assigned.next().flatten().ok_or_else(|| LrpErr::UnresolvedRule {
                position: fmt_position(path),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, Array4};

    use super::*;
    use crate::{
        arch::{
            activations::ActFn,
            layers::{Conv, Dense, Layer, LayerGroup, LayerType},
            Merge, Node, Parallel,
        },
        composite::TypeMap,
    };

    fn dense() -> Layer {
        Layer::dense(Dense::new(Array2::ones((2, 2)), Array1::zeros(2), Some(ActFn::Relu)).unwrap())
    }

    fn conv() -> Layer {
        Layer::conv(Conv::new(Array4::ones((1, 1, 2, 2)), Array1::zeros(1), (1, 1), (0, 0), None).unwrap())
    }

    fn names(rules: &Rules) -> Vec<String> {
        rules.leaves().iter().map(|r| r.name()).collect()
    }

    #[test]
    fn later_primitives_override_earlier_ones() {
        let chain = Chain::new([dense(), dense(), dense()]);
        let composite = Composite::new([
            Primitive::GlobalTypeMap(TypeMap::new().with(LayerType::Dense, Rule::epsilon(1e-6))),
            Primitive::FirstLayerMap(Rule::ZPlus),
        ]);

        let rules = composite.rules(&chain).unwrap();

        assert_eq!(
            names(&rules),
            vec!["ZPlusRule", "EpsilonRule(1e-6)", "EpsilonRule(1e-6)"]
        );
    }

    #[test]
    fn unassigned_layers_are_an_error() {
        let chain = Chain::new([conv(), Layer::Flatten, dense()]);
        let composite = Composite::new([Primitive::GlobalTypeMap(
            TypeMap::new().with(LayerGroup::Affine, Rule::Zero),
        )]);

        let err = composite.rules(&chain).unwrap_err();

        assert!(matches!(err, LrpErr::UnresolvedRule { ref position } if position == "2"));
    }

    #[test]
    fn range_and_index_maps_address_top_level_positions() {
        let chain = Chain::new([dense(), dense(), dense(), dense()]);
        let composite = Composite::new([
            Primitive::GlobalMap(Rule::Zero),
            Primitive::RangeMap {
                range: 2..=3,
                rule: Rule::gamma(0.25),
            },
            Primitive::LayerMap {
                index: 3,
                rule: Rule::Flat,
            },
            Primitive::LastLayerMap(Rule::epsilon(0.1)),
        ]);

        let rules = composite.rules(&chain).unwrap();

        assert_eq!(
            names(&rules),
            vec!["ZeroRule", "GammaRule(0.25)", "FlatRule", "EpsilonRule(1e-1)"]
        );
    }

    #[test]
    fn first_layer_of_a_parallel_block_is_every_branch_head() {
        let parallel = Parallel::new(
            Merge::Sum,
            [Node::from(Chain::new([dense(), dense()])), dense().into()],
        )
        .unwrap();
        let chain = Chain::new([Node::from(parallel), dense().into()]);
        let composite = Composite::new([
            Primitive::GlobalMap(Rule::Zero),
            Primitive::FirstLayerMap(Rule::WSquare),
        ]);

        let rules = composite.rules(&chain).unwrap();

        assert_eq!(
            names(&rules),
            vec!["WSquareRule", "ZeroRule", "WSquareRule", "ZeroRule"]
        );
    }

    #[test]
    fn first_n_type_map_stops_at_n() {
        let chain = Chain::new([dense(), dense(), dense()]);
        let composite = Composite::new([
            Primitive::GlobalMap(Rule::Zero),
            Primitive::FirstNTypeMap {
                n: 2,
                map: TypeMap::new().with(LayerType::Dense, Rule::ZPlus),
            },
        ]);

        let rules = composite.rules(&chain).unwrap();

        assert_eq!(names(&rules), vec!["ZPlusRule", "ZPlusRule", "ZeroRule"]);
    }
}
