use super::{Composite, Primitive, TypeMap};
use crate::{
    arch::layers::{LayerGroup, LayerType},
    rules::{Rule, DEFAULT_EPSILON, DEFAULT_GAMMA},
};

/// Pass through layers that don't mix features, ε on dense and pooling layers, `conv` on
/// convolutions.
fn base(conv: Rule) -> TypeMap {
    TypeMap::new()
        .with(LayerType::Conv, conv)
        .with(LayerType::Dense, Rule::epsilon(DEFAULT_EPSILON))
        .with(LayerGroup::Pooling, Rule::epsilon(DEFAULT_EPSILON))
        .with(LayerGroup::Reshaping, Rule::Pass)
        .with(LayerGroup::Dropout, Rule::Pass)
        .with(LayerGroup::Function, Rule::Pass)
}

fn flat_first_layer() -> Primitive {
    Primitive::FirstLayerTypeMap(TypeMap::new().with(LayerGroup::Affine, Rule::Flat))
}

impl Composite {
    /// `GammaRule` on convolutions and `ZBoxRule` on a first convolution reading inputs bounded
    /// by `[low, high]`.
    pub fn epsilon_gamma_box(low: f32, high: f32) -> Self {
        Composite::new([
            Primitive::GlobalTypeMap(base(Rule::gamma(DEFAULT_GAMMA))),
            Primitive::FirstLayerTypeMap(
                TypeMap::new().with(LayerType::Conv, Rule::zbox(low, high)),
            ),
        ])
    }

    pub fn epsilon_plus() -> Self {
        Composite::new([Primitive::GlobalTypeMap(base(Rule::ZPlus))])
    }

    pub fn epsilon_alpha2_beta1() -> Self {
        Composite::new([Primitive::GlobalTypeMap(base(Rule::alpha_beta(2., 1.)))])
    }

    pub fn epsilon_plus_flat() -> Self {
        Composite::epsilon_plus().then(flat_first_layer())
    }

    pub fn epsilon_alpha2_beta1_flat() -> Self {
        Composite::epsilon_alpha2_beta1().then(flat_first_layer())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, Array4};

    use crate::arch::{
        activations::ActFn,
        layers::{Conv, Dense, Layer},
        Chain,
    };

    use super::*;

    #[test]
    fn epsilon_gamma_box_assigns_zbox_to_the_input_convolution() {
        let conv = || {
            Layer::conv(
                Conv::new(Array4::ones((1, 1, 2, 2)), Array1::zeros(1), (1, 1), (0, 0), Some(ActFn::Relu))
                    .unwrap(),
            )
        };
        let chain = Chain::new([
            conv(),
            Layer::max_pool((2, 2), (2, 2)).unwrap(),
            conv(),
            Layer::Flatten,
            Layer::dense(Dense::new(Array2::ones((4, 2)), Array1::zeros(2), None).unwrap()),
        ]);

        let rules = Composite::epsilon_gamma_box(-1., 1.).rules(&chain).unwrap();
        let names: Vec<String> = rules.leaves().iter().map(|r| r.name()).collect();

        assert_eq!(
            names,
            vec![
                "ZBoxRule(-1, 1)",
                "EpsilonRule(1e-6)",
                "GammaRule(0.25)",
                "PassRule",
                "EpsilonRule(1e-6)",
            ]
        );
    }
}
