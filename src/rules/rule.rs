use std::{fmt, sync::Arc};

use ndarray::ArrayD;

use super::CustomRule;
use crate::{
    arch::layers::{Layer, Params},
    LrpErr, Result,
};

/// Stabilizer added to denominators by rules that don't define their own.
pub const DEFAULT_STABILIZER: f32 = 1e-9;
pub const DEFAULT_EPSILON: f32 = 1e-6;
pub const DEFAULT_GAMMA: f32 = 0.25;

/// Adds `eps` to every element of `d` with the element's sign, counting zero as positive.
pub fn stabilize(mut d: ArrayD<f32>, eps: f32) -> ArrayD<f32> {
    d.mapv_inplace(|d| if d >= 0. { d + eps } else { d - eps });
    d
}

/// A decomposition rule, deciding how the relevance of a layer's output is redistributed over its
/// input.
///
/// Rules are small value objects. Their behaviour is described by four hooks, all of which default
/// to the identity: [`Rule::modify_parameters`], [`Rule::modify_layer`], [`Rule::modify_input`] and
/// [`Rule::modify_denominator`] (which defaults to a tiny signed stabilizer). `ZBox`, `AlphaBeta`
/// and `Pass` have dedicated propagation laws instead.
#[derive(Clone)]
pub enum Rule {
    /// Plain LRP-0.
    Zero,
    /// LRP-ε, absorbs weak or contradictory contributions in the stabilizer.
    Epsilon { epsilon: f32 },
    /// LRP-γ, `w' = w + γ·relu(w)`, favours positive contributions.
    Gamma { gamma: f32 },
    /// LRP-w², meant for the first layer: `w' = w²`, no bias, unit input.
    WSquare,
    /// Like `WSquare` with `w' = 1`, spreads relevance uniformly over the receptive field.
    Flat,
    /// LRP-z^B, for the first layer of bounded inputs in `[low, high]`.
    ZBox { low: f32, high: f32 },
    /// LRP-z⁺, only positive weights, bias and input.
    ZPlus,
    /// LRP-αβ, weights positive contributions by `α` and negative ones by `β`.
    AlphaBeta { alpha: f32, beta: f32 },
    /// Hands the relevance through unchanged, reshaped to the input.
    Pass,
    Custom(Arc<dyn CustomRule>),
}
use Rule::*;

impl Rule {
    pub fn epsilon(epsilon: f32) -> Self {
        Epsilon { epsilon }
    }

    pub fn gamma(gamma: f32) -> Self {
        Gamma { gamma }
    }

    pub fn zbox(low: f32, high: f32) -> Self {
        ZBox { low, high }
    }

    pub fn alpha_beta(alpha: f32, beta: f32) -> Self {
        AlphaBeta { alpha, beta }
    }

    pub fn custom<R>(rule: R) -> Self
    where
        R: CustomRule + 'static,
    {
        Custom(Arc::new(rule))
    }

    pub fn name(&self) -> String {
        match self {
            Zero => "ZeroRule".into(),
            Epsilon { epsilon } => format!("EpsilonRule({epsilon:e})"),
            Gamma { gamma } => format!("GammaRule({gamma})"),
            WSquare => "WSquareRule".into(),
            Flat => "FlatRule".into(),
            ZBox { low, high } => format!("ZBoxRule({low}, {high})"),
            ZPlus => "ZPlusRule".into(),
            AlphaBeta { alpha, beta } => format!("AlphaBetaRule({alpha}, {beta})"),
            Pass => "PassRule".into(),
            Custom(r) => r.name().to_string(),
        }
    }

    /// Checks the rule's own parameters.
    pub fn validate(&self) -> Result<()> {
        let invalid = |rule: &'static str, reason: &str| -> Result<()> {
            Err(LrpErr::InvalidRule {
                rule,
                reason: reason.to_string(),
            })
        };

        match *self {
            Epsilon { epsilon } if !(epsilon >= 0.) => invalid("epsilon", "ε must be non negative"),
            Gamma { gamma } if !(gamma >= 0.) => invalid("gamma", "γ must be non negative"),
            ZBox { low, high } if !(low <= high) => invalid("zbox", "low must not exceed high"),
            AlphaBeta { alpha, beta } if !(alpha >= 0. && beta >= 0.) => {
                invalid("alpha-beta", "α and β must be non negative")
            }
            _ => Ok(()),
        }
    }

    /// Whether the rule only makes sense on layers with weights.
    pub fn requires_params(&self) -> bool {
        matches!(
            self,
            Gamma { .. } | WSquare | Flat | ZBox { .. } | ZPlus | AlphaBeta { .. }
        )
    }

    pub fn is_compatible(&self, layer: &Layer) -> bool {
        match self {
            Pass => layer.preserves_size(),
            Custom(r) => r.is_compatible(layer),
            rule if rule.requires_params() => layer.params().is_some(),
            _ => true,
        }
    }

    pub fn modify_parameters(&self, params: Params) -> Params {
        match self {
            Gamma { gamma } => {
                let gamma = *gamma;
                params.map(|p| p + gamma * p.max(0.))
            }
            WSquare => params.map(|p| p * p).without_bias(),
            Flat => params.map(|_| 1.).without_bias(),
            ZPlus => params.map(|p| p.max(0.)),
            Custom(r) => r.modify_parameters(&params).unwrap_or(params),
            _ => params,
        }
    }

    /// A replacement for the whole layer, taking precedence over [`Rule::modify_parameters`].
    pub fn modify_layer(&self, layer: &Layer) -> Option<Layer> {
        match self {
            Custom(r) => r.modify_layer(layer),
            _ => None,
        }
    }

    pub fn modify_input(&self, x: ArrayD<f32>) -> ArrayD<f32> {
        match self {
            WSquare | Flat => ArrayD::ones(x.raw_dim()),
            ZPlus => x.mapv_into(|x| x.max(0.)),
            Custom(r) => r.modify_input(x),
            _ => x,
        }
    }

    pub fn modify_denominator(&self, d: ArrayD<f32>) -> ArrayD<f32> {
        match self {
            Epsilon { epsilon } => stabilize(d, *epsilon),
            Custom(r) => r.modify_denominator(d),
            _ => stabilize(d, DEFAULT_STABILIZER),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    fn params() -> Params {
        Params {
            weight: arr2(&[[1.0, -2.0], [0.5, 0.0]]).into_dyn(),
            bias: arr1(&[-1.0, 2.0]).into_dyn(),
        }
    }

    #[test]
    fn stabilize_keeps_the_sign() {
        let d = arr1(&[-1.0, 0.0, 2.0]).into_dyn();

        let d = stabilize(d, 0.5);

        assert_eq!(d, arr1(&[-1.5, 0.5, 2.5]).into_dyn());
    }

    #[test]
    fn gamma_upweights_positive_parameters() {
        let p = Rule::gamma(0.5).modify_parameters(params());

        assert_eq!(p.weight, arr2(&[[1.5, -2.0], [0.75, 0.0]]).into_dyn());
        assert_eq!(p.bias, arr1(&[-1.0, 3.0]).into_dyn());
    }

    #[test]
    fn wsquare_squares_weights_and_drops_bias() {
        let p = WSquare.modify_parameters(params());

        assert_eq!(p.weight, arr2(&[[1.0, 4.0], [0.25, 0.0]]).into_dyn());
        assert!(p.bias.iter().all(|&b| b == 0.));
    }

    #[test]
    fn zero_rule_leaves_parameters_alone() {
        assert_eq!(Zero.modify_parameters(params()), params());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Rule::epsilon(-1.0).validate().is_err());
        assert!(Rule::zbox(1.0, 0.0).validate().is_err());
        assert!(Rule::alpha_beta(2.0, -1.0).validate().is_err());
        assert!(Rule::alpha_beta(2.0, 1.0).validate().is_ok());
    }
}
