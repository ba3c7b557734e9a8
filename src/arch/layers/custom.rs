use ndarray::{ArrayD, ArrayViewD};

use crate::{LrpErr, Result};

const FD_STEP: f32 = 1e-3;

/// An opaque, user-defined layer.
///
/// Layers of this kind are only propagated through by the generic rule, which needs a
/// vector-Jacobian product. The provided [`CustomLayer::pullback`] approximates it with central
/// differences; implementors with an analytic gradient should override it.
pub trait CustomLayer: Send + Sync {
    /// The identity under which the layer is registered as supported.
    fn name(&self) -> &str;

    fn forward(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>>;

    /// Computes `J(x)ᵀ · d`, where `J` is the Jacobian of [`CustomLayer::forward`].
    fn pullback(&self, x: ArrayViewD<f32>, d: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let mut shifted = x.to_owned();
        let mut grad = ArrayD::zeros(x.raw_dim());

        for (i, g) in grad.iter_mut().enumerate() {
            let orig = shifted.iter().nth(i).copied().unwrap_or_default();
            set_nth(&mut shifted, i, orig + FD_STEP);
            let hi = project(self.forward(shifted.view())?, d.view())?;
            set_nth(&mut shifted, i, orig - FD_STEP);
            let lo = project(self.forward(shifted.view())?, d.view())?;
            set_nth(&mut shifted, i, orig);

            *g = (hi - lo) / (2. * FD_STEP);
        }

        Ok(grad)
    }
}

fn project(y: ArrayD<f32>, d: ArrayViewD<f32>) -> Result<f32> {
    if y.shape() != d.shape() {
        return Err(LrpErr::shape(
            "custom layer cotangent",
            d.shape(),
            format!("{:?}", y.shape()),
        ));
    }

    Ok((&y * &d).sum())
}

fn set_nth(a: &mut ArrayD<f32>, i: usize, value: f32) {
    if let Some(v) = a.iter_mut().nth(i) {
        *v = value;
    }
}
