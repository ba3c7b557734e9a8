use ndarray::prelude::*;

use super::Params;
use crate::{arch::activations::ActFn, LrpErr, Result};

/// A 2D convolution over `(batch, channels, height, width)` inputs.
#[derive(Clone, Debug)]
pub struct Conv {
    weight: Array4<f32>,
    bias: Array1<f32>,
    stride: (usize, usize),
    padding: (usize, usize),
    act_fn: Option<ActFn>,
}

impl Conv {
    /// Creates a new `Conv` layer.
    ///
    /// # Arguments
    /// * `weight` - An `(out_channels, in_channels, kernel_h, kernel_w)` kernel.
    /// * `bias` - A bias vector of length `out_channels`.
    /// * `stride` - The vertical and horizontal stride, both at least 1.
    /// * `padding` - Zero padding added on each side.
    /// * `act_fn` - The embedded activation function, if any.
    pub fn new(
        weight: Array4<f32>,
        bias: Array1<f32>,
        stride: (usize, usize),
        padding: (usize, usize),
        act_fn: Option<ActFn>,
    ) -> Result<Self> {
        if bias.len() != weight.dim().0 {
            return Err(LrpErr::shape(
                "conv bias",
                bias.shape(),
                format!("[{}]", weight.dim().0),
            ));
        }
        if stride.0 == 0 || stride.1 == 0 {
            return Err(LrpErr::shape("conv stride", &[stride.0, stride.1], "non zero"));
        }

        Ok(Self {
            weight,
            bias,
            stride,
            padding,
            act_fn,
        })
    }

    pub fn act_fn(&self) -> Option<&ActFn> {
        self.act_fn.as_ref()
    }

    /// Returns `(out_channels, in_channels, kernel_h, kernel_w)`.
    pub fn dim(&self) -> (usize, usize, usize, usize) {
        self.weight.dim()
    }

    pub fn params(&self) -> Params {
        Params {
            weight: self.weight.clone().into_dyn(),
            bias: self.bias.clone().into_dyn(),
        }
    }

    /// Builds a layer of the same geometry with the given parameters and no activation.
    pub fn with_params(&self, params: Params) -> Result<Self> {
        let weight = params
            .weight
            .into_dimensionality::<Ix4>()
            .map_err(|_| LrpErr::shape("conv weight", &[], "a rank 4 kernel"))?;
        if weight.dim() != self.dim() {
            return Err(LrpErr::shape(
                "conv weight",
                weight.shape(),
                format!("{:?}", self.dim()),
            ));
        }
        let bias = params
            .bias
            .into_dimensionality::<Ix1>()
            .map_err(|_| LrpErr::shape("conv bias", &[], "a vector"))?;

        Self::new(weight, bias, self.stride, self.padding, None)
    }

    pub fn pre_activation(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let x = self.view_input(x)?;
        let (batch, in_c, h, w) = x.dim();
        let (out_c, _, kh, kw) = self.dim();
        let (oh, ow) = self.output_hw(h, w)?;

        let mut z = Array4::zeros((batch, out_c, oh, ow));
        for ((n, o, i, j), z) in z.indexed_iter_mut() {
            let mut acc = self.bias[o];
            for c in 0..in_c {
                for u in 0..kh {
                    for v in 0..kw {
                        if let Some((y, x_)) = self.source(i, j, u, v, h, w) {
                            acc += self.weight[[o, c, u, v]] * x[[n, c, y, x_]];
                        }
                    }
                }
            }
            *z = acc;
        }

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
                let z = self.pre_activation(x.view())?;
                act_fn.pullback(z.view(), d)
            }
            None => d.to_owned(),
        };
        let x = self.view_input(x)?;
        let (batch, in_c, h, w) = x.dim();
        let (out_c, _, kh, kw) = self.dim();
        let (oh, ow) = self.output_hw(h, w)?;
        let d = d
            .into_dimensionality::<Ix4>()
            .map_err(|_| LrpErr::shape("conv cotangent", &[], "a rank 4 tensor"))?;
        if d.dim() != (batch, out_c, oh, ow) {
            return Err(LrpErr::shape(
                "conv cotangent",
                d.shape(),
                format!("{:?}", (batch, out_c, oh, ow)),
            ));
        }

        let mut grad = Array4::zeros((batch, in_c, h, w));
        for ((n, o, i, j), &g) in d.indexed_iter() {
            if g == 0. {
                continue;
            }
            for c in 0..in_c {
                for u in 0..kh {
                    for v in 0..kw {
                        if let Some((y, x_)) = self.source(i, j, u, v, h, w) {
                            grad[[n, c, y, x_]] += self.weight[[o, c, u, v]] * g;
                        }
                    }
                }
            }
        }

        Ok(grad.into_dyn())
    }

    /// Maps an output position and a kernel offset to the input pixel it reads, if not padding.
    fn source(
        &self,
        i: usize,
        j: usize,
        u: usize,
        v: usize,
        h: usize,
        w: usize,
    ) -> Option<(usize, usize)> {
        let y = (i * self.stride.0 + u).checked_sub(self.padding.0)?;
        let x = (j * self.stride.1 + v).checked_sub(self.padding.1)?;
        (y < h && x < w).then_some((y, x))
    }

    fn output_hw(&self, h: usize, w: usize) -> Result<(usize, usize)> {
        let (_, _, kh, kw) = self.dim();
        let (ph, pw) = (h + 2 * self.padding.0, w + 2 * self.padding.1);
        if ph < kh || pw < kw {
            return Err(LrpErr::shape(
                "conv input",
                &[h, w],
                format!("at least {kh}x{kw} after padding"),
            ));
        }

        Ok(((ph - kh) / self.stride.0 + 1, (pw - kw) / self.stride.1 + 1))
    }

    fn view_input<'a>(&self, x: ArrayViewD<'a, f32>) -> Result<ArrayView4<'a, f32>> {
        let shape = x.shape().to_vec();
        let in_c = self.dim().1;
        let expected = || format!("[batch, {in_c}, height, width]");
        let x = x
            .into_dimensionality::<Ix4>()
            .map_err(|_| LrpErr::shape("conv input", &shape, expected()))?;
        if x.dim().1 != in_c {
            return Err(LrpErr::shape("conv input", &shape, expected()));
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pullback_is_the_adjoint_of_the_convolution() {
        let weight = Array4::from_shape_fn((2, 1, 2, 2), |(o, _, u, v)| (o + u * 2 + v) as f32 - 1.5);
        let conv = Conv::new(weight, Array1::zeros(2), (1, 1), (1, 1), None).unwrap();
        let x = Array4::from_shape_fn((1, 1, 3, 3), |(_, _, i, j)| (i * 3 + j) as f32).into_dyn();
        let z = conv.forward(x.view()).unwrap();
        let d = z.mapv(|z| z.sin());

        // <conv(x), d> == <x, conv^T(d)> for a bias free convolution
        let lhs = (&z * &d).sum();
        let rhs = (&x * &conv.pullback(x.view(), d.view()).unwrap()).sum();

        assert!((lhs - rhs).abs() < 1e-3);
    }

    #[test]
    fn output_shape_follows_stride_and_padding() {
        let conv = Conv::new(Array4::ones((3, 2, 3, 3)), Array1::zeros(3), (2, 2), (1, 1), None).unwrap();
        let x = Array4::<f32>::ones((4, 2, 7, 7)).into_dyn();

        let z = conv.forward(x.view()).unwrap();

        assert_eq!(z.shape(), &[4, 3, 4, 4]);
    }
}
