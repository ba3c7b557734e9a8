use std::{fmt, sync::Arc};

use ndarray::{ArrayD, ArrayViewD};

use super::CustomActivation;

/// An activation function, either embedded in an affine layer or used as a plain function layer.
#[derive(Clone)]
pub enum ActFn {
    Identity,
    Relu,
    LeakyRelu { slope: f32 },
    Relu6,
    Sigmoid,
    Tanh,
    /// Normalizes every sample of the batch into a probability distribution.
    Softmax,
    Custom(Arc<dyn CustomActivation>),
}
use ActFn::*;

impl ActFn {
    pub fn leaky_relu(slope: f32) -> Self {
        LeakyRelu { slope }
    }

    pub fn custom<A>(act_fn: A) -> Self
    where
        A: CustomActivation + 'static,
    {
        Custom(Arc::new(act_fn))
    }

    /// The identity of this function, used as its key in the compatibility registry.
    pub fn name(&self) -> &str {
        match self {
            Identity => "identity",
            Relu => "relu",
            LeakyRelu { .. } => "leaky_relu",
            Relu6 => "relu6",
            Sigmoid => "sigmoid",
            Tanh => "tanh",
            Softmax => "softmax",
            Custom(a) => a.name(),
        }
    }

    /// Whether LRP supports this function without registration.
    pub fn is_relu_like(&self) -> bool {
        matches!(self, Identity | Relu | LeakyRelu { .. } | Relu6)
    }

    /// Whether this function turns its input into a probability distribution.
    pub fn is_normalizing(&self) -> bool {
        matches!(self, Softmax)
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Identity => x,
            Relu => x.max(0.),
            LeakyRelu { slope } => {
                if x > 0. {
                    x
                } else {
                    slope * x
                }
            }
            Relu6 => x.clamp(0., 6.),
            Sigmoid => 1. / (1. + (-x).exp()),
            Tanh => x.tanh(),
            // not elementwise, see `apply`
            Softmax => x.exp(),
            Custom(a) => a.f(x),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Identity | Softmax => 1.,
            Relu => {
                if x > 0. {
                    1.
                } else {
                    0.
                }
            }
            LeakyRelu { slope } => {
                if x > 0. {
                    1.
                } else {
                    *slope
                }
            }
            Relu6 => {
                if x > 0. && x < 6. {
                    1.
                } else {
                    0.
                }
            }
            Sigmoid => {
                let s = self.f(x);
                s * (1. - s)
            }
            Tanh => 1. - x.tanh().powi(2),
            Custom(a) => a.df(x),
        }
    }

    /// Applies the function to a batch, sample-wise for `Softmax` and elementwise otherwise.
    pub fn apply(&self, z: ArrayViewD<f32>) -> ArrayD<f32> {
        match self {
            Identity => z.to_owned(),
            Softmax => {
                let mut a = z.to_owned();
                for mut sample in a.outer_iter_mut() {
                    let max = sample.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
                    sample.mapv_inplace(|x| (x - max).exp());
                    let sum = sample.sum();
                    sample.mapv_inplace(|x| x / sum);
                }
                a
            }
            _ => z.mapv(|x| self.f(x)),
        }
    }

    /// Vector-Jacobian product of [`ActFn::apply`] at `z`.
    pub fn pullback(&self, z: ArrayViewD<f32>, cotangent: ArrayViewD<f32>) -> ArrayD<f32> {
        match self {
            Softmax => {
                let s = self.apply(z);
                let mut grad = cotangent.to_owned();
                for (mut grad, s) in grad.outer_iter_mut().zip(s.outer_iter()) {
                    let dot = (&grad * &s).sum();
                    grad.zip_mut_with(&s, |g, &s| *g = s * (*g - dot));
                }
                grad
            }
            _ => {
                let mut grad = cotangent.to_owned();
                grad.zip_mut_with(&z, |g, &z| *g *= self.df(z));
                grad
            }
        }
    }
}

impl fmt::Debug for ActFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeakyRelu { slope } => write!(f, "leaky_relu({slope})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr2, Axis};

    use super::*;

    #[test]
    fn softmax_rows_sum_to_one() {
        let z = arr2(&[[1.0, 2.0, 3.0], [-1.0, 0.0, 4.0]]).into_dyn();
        let a = Softmax.apply(z.view());

        for sum in a.sum_axis(Axis(1)) {
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn relu_family_is_builtin() {
        assert!(Relu.is_relu_like());
        assert!(ActFn::leaky_relu(0.1).is_relu_like());
        assert!(!Tanh.is_relu_like());
        assert!(Softmax.is_normalizing());
    }

    #[test]
    fn leaky_relu_pullback_scales_negative_side() {
        let z = arr2(&[[-2.0, 3.0]]).into_dyn();
        let g = arr2(&[[1.0, 1.0]]).into_dyn();
        let grad = ActFn::leaky_relu(0.1).pullback(z.view(), g.view());

        assert_eq!(grad, arr2(&[[0.1, 1.0]]).into_dyn());
    }
}
