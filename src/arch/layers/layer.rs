use std::{fmt, sync::Arc};

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use super::{Conv, CustomLayer, Dense, Pool, PoolKind};
use crate::{arch::activations::ActFn, LrpErr, Result};

/// Learnable parameters of an affine layer, as handed to rules for modification.
#[derive(Clone, Debug, PartialEq)]
pub struct Params {
    pub weight: ArrayD<f32>,
    pub bias: ArrayD<f32>,
}

impl Params {
    /// Applies `f` to both the weight and the bias.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            weight: self.weight.mapv(&f),
            bias: self.bias.mapv(&f),
        }
    }

    /// Same weights, zero bias.
    pub fn without_bias(self) -> Self {
        Self {
            bias: ArrayD::zeros(self.bias.raw_dim()),
            ..self
        }
    }
}

/// A single operation of a model.
#[derive(Clone)]
pub enum Layer {
    Dense(Dense),
    Conv(Conv),
    Pool(Pool),
    /// Collapses every non batch axis into one.
    Flatten,
    /// Reshapes every sample to the given per-sample shape.
    Reshape(Vec<usize>),
    /// Identity at inference time.
    Dropout(f32),
    /// A plain function applied to its input.
    Function(ActFn),
    Custom(Arc<dyn CustomLayer>),
}
use Layer::*;

/// The type of a layer, used for type based rule matching and compatibility checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LayerType {
    Dense,
    Conv,
    MaxPool,
    MeanPool,
    Flatten,
    Reshape,
    Dropout,
    /// A function layer, identified by the function's name.
    Function(String),
    /// A custom layer, identified by its name.
    Custom(String),
}

impl LayerType {
    pub fn function(name: impl Into<String>) -> Self {
        LayerType::Function(name.into())
    }

    pub fn custom(name: impl Into<String>) -> Self {
        LayerType::Custom(name.into())
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerType::Function(name) | LayerType::Custom(name) => f.write_str(name),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Families of layer types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerGroup {
    /// Dense and convolutional layers.
    Affine,
    Convolution,
    Pooling,
    Reshaping,
    Dropout,
    /// Any plain function layer.
    Function,
}

impl LayerGroup {
    pub fn contains(&self, ty: &LayerType) -> bool {
        use LayerType as T;

        match self {
            LayerGroup::Affine => matches!(ty, T::Dense | T::Conv),
            LayerGroup::Convolution => matches!(ty, T::Conv),
            LayerGroup::Pooling => matches!(ty, T::MaxPool | T::MeanPool),
            LayerGroup::Reshaping => matches!(ty, T::Flatten | T::Reshape),
            LayerGroup::Dropout => matches!(ty, T::Dropout),
            LayerGroup::Function => matches!(ty, T::Function(_)),
        }
    }
}

impl Layer {
    pub fn dense(dense: Dense) -> Self {
        Dense(dense)
    }

    pub fn conv(conv: Conv) -> Self {
        Conv(conv)
    }

    pub fn max_pool(window: (usize, usize), stride: (usize, usize)) -> Result<Self> {
        Ok(Pool(Pool::new(PoolKind::Max, window, stride)?))
    }

    pub fn mean_pool(window: (usize, usize), stride: (usize, usize)) -> Result<Self> {
        Ok(Pool(Pool::new(PoolKind::Mean, window, stride)?))
    }

    pub fn function(act_fn: ActFn) -> Self {
        Function(act_fn)
    }

    pub fn custom<L>(layer: L) -> Self
    where
        L: CustomLayer + 'static,
    {
        Custom(Arc::new(layer))
    }

    pub fn layer_type(&self) -> LayerType {
        match self {
            Dense(_) => LayerType::Dense,
            Conv(_) => LayerType::Conv,
            Pool(p) => match p.kind() {
                PoolKind::Max => LayerType::MaxPool,
                PoolKind::Mean => LayerType::MeanPool,
            },
            Flatten => LayerType::Flatten,
            Reshape(_) => LayerType::Reshape,
            Dropout(_) => LayerType::Dropout,
            Function(f) => LayerType::function(f.name()),
            Custom(l) => LayerType::custom(l.name()),
        }
    }

    /// The activation function embedded in this layer, if any.
    pub fn act_fn(&self) -> Option<&ActFn> {
        match self {
            Dense(l) => l.act_fn(),
            Conv(l) => l.act_fn(),
            _ => None,
        }
    }

    /// The activation function applied last by this layer, embedded or as a plain function.
    pub fn output_fn(&self) -> Option<&ActFn> {
        match self {
            Function(f) => Some(f),
            other => other.act_fn(),
        }
    }

    pub fn params(&self) -> Option<Params> {
        match self {
            Dense(l) => Some(l.params()),
            Conv(l) => Some(l.params()),
            _ => None,
        }
    }

    /// Rebuilds an affine layer with new parameters, dropping its activation.
    ///
    /// Layers without parameters are returned unchanged.
    pub fn with_params(&self, params: Params) -> Result<Self> {
        match self {
            Dense(l) => Ok(Dense(l.with_params(params)?)),
            Conv(l) => Ok(Conv(l.with_params(params)?)),
            other => Ok(other.clone()),
        }
    }

    /// This layer without its embedded activation.
    pub fn linear(&self) -> Result<Self> {
        match self.params() {
            Some(params) => self.with_params(params),
            None => Ok(self.clone()),
        }
    }

    /// Whether this layer keeps the number of elements of its input.
    pub fn preserves_size(&self) -> bool {
        matches!(self, Flatten | Reshape(_) | Dropout(_) | Function(_))
    }

    pub fn forward(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Dense(l) => l.forward(x),
            Conv(l) => l.forward(x),
            Pool(l) => l.forward(x),
            Flatten => {
                let batch = batch_size(&x)?;
                let shape = [batch, x.len() / batch.max(1)];
                reshape(x, &shape)
            }
            Reshape(shape) => {
                let batch = batch_size(&x)?;
                let shape: Vec<usize> = std::iter::once(batch).chain(shape.iter().copied()).collect();
                reshape(x, &shape)
            }
            Dropout(_) => Ok(x.to_owned()),
            Function(f) => Ok(f.apply(x)),
            Custom(l) => l.forward(x),
        }
    }

    /// Computes `J(x)ᵀ · d`, the vector-Jacobian product of [`Layer::forward`] at `x`.
    pub fn pullback(&self, x: ArrayViewD<f32>, d: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Dense(l) => l.pullback(x, d),
            Conv(l) => l.pullback(x, d),
            Pool(l) => l.pullback(x, d),
            Flatten | Reshape(_) => reshape(d, x.shape()),
            Dropout(_) => Ok(d.to_owned()),
            Function(f) => Ok(f.pullback(x, d)),
            Custom(l) => l.pullback(x, d),
        }
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dense(l) => {
                let (i, o) = l.dim();
                write!(f, "Dense({i} => {o}")?;
                if let Some(act_fn) = l.act_fn() {
                    write!(f, ", {act_fn:?}")?;
                }
                write!(f, ")")
            }
            Conv(l) => {
                let (o, i, kh, kw) = l.dim();
                write!(f, "Conv(({kh}, {kw}), {i} => {o}")?;
                if let Some(act_fn) = l.act_fn() {
                    write!(f, ", {act_fn:?}")?;
                }
                write!(f, ")")
            }
            Pool(l) => {
                let (kh, kw) = l.window();
                match l.kind() {
                    PoolKind::Max => write!(f, "MaxPool(({kh}, {kw}))"),
                    PoolKind::Mean => write!(f, "MeanPool(({kh}, {kw}))"),
                }
            }
            Flatten => write!(f, "Flatten"),
            Reshape(shape) => write!(f, "Reshape({shape:?})"),
            Dropout(p) => write!(f, "Dropout({p})"),
            Function(act_fn) => write!(f, "{act_fn:?}"),
            Custom(l) => write!(f, "{}", l.name()),
        }
    }
}

fn batch_size(x: &ArrayViewD<f32>) -> Result<usize> {
    x.shape()
        .first()
        .copied()
        .ok_or_else(|| LrpErr::shape("layer input", x.shape(), "a leading batch axis"))
}

/// Copies `x` into a new array of the given shape, in logical order.
pub(crate) fn reshape(x: ArrayViewD<f32>, shape: &[usize]) -> Result<ArrayD<f32>> {
    let got = x.shape().to_vec();
    ArrayD::from_shape_vec(IxDyn(shape), x.iter().copied().collect())
        .map_err(|_| LrpErr::shape("reshape", &got, format!("{} elements", shape.iter().product::<usize>())))
}
