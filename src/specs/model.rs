use serde::{Deserialize, Serialize};

/// A dense tensor, stored in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// The specification for the `ActFn` enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnSpec {
    Identity,
    Relu,
    LeakyRelu { slope: f32 },
    Relu6,
    Sigmoid,
    Tanh,
    Softmax,
}

/// The specification for the `Merge` enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeSpec {
    Sum,
    Concat { axis: usize },
}

fn unit_stride() -> (usize, usize) {
    (1, 1)
}

/// The specification for a node of a `Chain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    /// `weight` is `(in, out)`.
    Dense {
        weight: TensorSpec,
        bias: Vec<f32>,
        act_fn: Option<ActFnSpec>,
    },
    /// `weight` is `(out_channels, in_channels, kernel_height, kernel_width)`.
    Conv {
        weight: TensorSpec,
        bias: Vec<f32>,
        #[serde(default = "unit_stride")]
        stride: (usize, usize),
        #[serde(default)]
        padding: (usize, usize),
        act_fn: Option<ActFnSpec>,
    },
    MaxPool {
        window: (usize, usize),
        stride: (usize, usize),
    },
    MeanPool {
        window: (usize, usize),
        stride: (usize, usize),
    },
    Flatten,
    Reshape {
        shape: Vec<usize>,
    },
    Dropout {
        p: f32,
    },
    Function {
        act_fn: ActFnSpec,
    },
    Chain {
        layers: Vec<LayerSpec>,
    },
    Parallel {
        merge: MergeSpec,
        branches: Vec<LayerSpec>,
    },
}

/// The specification for the model to explain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Chain { layers: Vec<LayerSpec> },
}
