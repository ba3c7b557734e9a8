use ndarray::ArrayD;

use super::{stabilize, DEFAULT_STABILIZER};
use crate::arch::layers::{Layer, Params};

/// A user-defined rule, propagated with the generic rule:
/// `R = x' ⊙ (J(x')ᵀ · R_out / modify_denominator(layer'(x')))`, where `x'` and `layer'` are the
/// modified input and layer.
///
/// Returning a layer from [`CustomRule::modify_layer`] together with parameters from
/// [`CustomRule::modify_parameters`] for the same layer is rejected when the analyzer is built.
pub trait CustomRule: Send + Sync {
    fn name(&self) -> &str;

    fn modify_parameters(&self, _params: &Params) -> Option<Params> {
        None
    }

    fn modify_layer(&self, _layer: &Layer) -> Option<Layer> {
        None
    }

    fn modify_input(&self, x: ArrayD<f32>) -> ArrayD<f32> {
        x
    }

    fn modify_denominator(&self, d: ArrayD<f32>) -> ArrayD<f32> {
        stabilize(d, DEFAULT_STABILIZER)
    }

    fn is_compatible(&self, _layer: &Layer) -> bool {
        true
    }
}
