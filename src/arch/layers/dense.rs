use ndarray::prelude::*;

use super::Params;
use crate::{arch::activations::ActFn, LrpErr, Result};

/// A fully connected layer computing `act_fn(x · w + b)` over a `(batch, in)` input.
#[derive(Clone, Debug)]
pub struct Dense {
    weight: Array2<f32>,
    bias: Array1<f32>,
    act_fn: Option<ActFn>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `weight` - An `(in, out)` weight matrix.
    /// * `bias` - A bias vector of length `out`.
    /// * `act_fn` - The embedded activation function, if any.
    ///
    /// # Returns
    /// The layer, or a shape error if the bias doesn't match the weights.
    pub fn new(weight: Array2<f32>, bias: Array1<f32>, act_fn: Option<ActFn>) -> Result<Self> {
        if bias.len() != weight.ncols() {
            return Err(LrpErr::shape(
                "dense bias",
                bias.shape(),
                format!("[{}]", weight.ncols()),
            ));
        }

        Ok(Self {
            weight,
            bias,
            act_fn,
        })
    }

    /// Returns the `(in, out)` dimensions of this layer.
    pub fn dim(&self) -> (usize, usize) {
        self.weight.dim()
    }

    pub fn act_fn(&self) -> Option<&ActFn> {
        self.act_fn.as_ref()
    }

    pub fn params(&self) -> Params {
        Params {
            weight: self.weight.clone().into_dyn(),
            bias: self.bias.clone().into_dyn(),
        }
    }

    /// Builds a layer of the same shape with the given parameters and no activation.
    pub fn with_params(&self, params: Params) -> Result<Self> {
        let weight = params
            .weight
            .into_dimensionality::<Ix2>()
            .map_err(|_| LrpErr::shape("dense weight", &[], "a matrix"))?;
        if weight.dim() != self.dim() {
            return Err(LrpErr::shape(
                "dense weight",
                weight.shape(),
                format!("{:?}", self.dim()),
            ));
        }
        let bias = params
            .bias
            .into_dimensionality::<Ix1>()
            .map_err(|_| LrpErr::shape("dense bias", &[], "a vector"))?;

        Self::new(weight, bias, None)
    }

    /// Computes `x · w + b`, without the activation.
    pub fn pre_activation(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let x = self.view_input(x)?;
        let z = x.dot(&self.weight) + &self.bias;
        Ok(z.into_dyn())
    }

    pub fn forward(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let z = self.pre_activation(x)?;
        match &self.act_fn {
            Some(act_fn) => Ok(act_fn.apply(z.view())),
            None => Ok(z),
        }
    }

    pub fn pullback(&self, x: ArrayViewD<f32>, d: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let d = match &self.act_fn {
            Some(act_fn) => {
                let z = self.pre_activation(x)?;
                act_fn.pullback(z.view(), d)
            }
            None => d.to_owned(),
        };
        let d = d
            .into_dimensionality::<Ix2>()
            .map_err(|_| LrpErr::shape("dense cotangent", &[], "a (batch, out) matrix"))?;

        Ok(d.dot(&self.weight.t()).into_dyn())
    }

    fn view_input<'a>(&self, x: ArrayViewD<'a, f32>) -> Result<ArrayView2<'a, f32>> {
        let shape = x.shape().to_vec();
        let expected = || format!("[batch, {}]", self.weight.nrows());
        let x = x
            .into_dimensionality::<Ix2>()
            .map_err(|_| LrpErr::shape("dense input", &shape, expected()))?;
        if x.ncols() != self.weight.nrows() {
            return Err(LrpErr::shape("dense input", &shape, expected()));
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    #[test]
    fn forward_applies_weights_bias_and_activation() {
        let dense = Dense::new(
            arr2(&[[1.0, -1.0], [2.0, 0.5]]),
            arr1(&[0.5, -3.0]),
            Some(ActFn::Relu),
        )
        .unwrap();
        let x = arr2(&[[1.0, 1.0]]).into_dyn();

        let y = dense.forward(x.view()).unwrap();

        assert_eq!(y, arr2(&[[3.5, 0.0]]).into_dyn());
    }

    #[test]
    fn rejects_wrong_input_width() {
        let dense = Dense::new(Array2::zeros((3, 2)), Array1::zeros(2), None).unwrap();
        let x = Array2::<f32>::zeros((1, 2)).into_dyn();

        assert!(dense.forward(x.view()).is_err());
    }
}
