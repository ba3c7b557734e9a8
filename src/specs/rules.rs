use serde::{Deserialize, Serialize};

use crate::rules::{DEFAULT_EPSILON, DEFAULT_GAMMA};

fn default_epsilon() -> f32 {
    DEFAULT_EPSILON
}

fn default_gamma() -> f32 {
    DEFAULT_GAMMA
}

fn default_alpha() -> f32 {
    2.
}

fn default_beta() -> f32 {
    1.
}

/// The specification for the `Rule` enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSpec {
    Zero,
    Epsilon {
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    Gamma {
        #[serde(default = "default_gamma")]
        gamma: f32,
    },
    WSquare,
    Flat,
    ZBox {
        low: f32,
        high: f32,
    },
    ZPlus,
    AlphaBeta {
        #[serde(default = "default_alpha")]
        alpha: f32,
        #[serde(default = "default_beta")]
        beta: f32,
    },
    Pass,
}

/// The specification for the `LayerType` enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerTypeSpec {
    Dense,
    Conv,
    MaxPool,
    MeanPool,
    Flatten,
    Reshape,
    Dropout,
    Function { name: String },
    Custom { name: String },
}

/// The specification for the `LayerGroup` enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerGroupSpec {
    Affine,
    Convolution,
    Pooling,
    Reshaping,
    Dropout,
    Function,
}

/// One entry of a type map, matching either a layer type or a layer group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeMapEntrySpec {
    #[serde(default)]
    pub layer: Option<LayerTypeSpec>,
    #[serde(default)]
    pub group: Option<LayerGroupSpec>,
    pub rule: RuleSpec,
}

/// The specification for the `Primitive` enum. Ranges are inclusive and 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveSpec {
    LayerMap {
        index: usize,
        rule: RuleSpec,
    },
    GlobalMap {
        rule: RuleSpec,
    },
    RangeMap {
        range: (usize, usize),
        rule: RuleSpec,
    },
    FirstLayerMap {
        rule: RuleSpec,
    },
    LastLayerMap {
        rule: RuleSpec,
    },
    GlobalTypeMap {
        map: Vec<TypeMapEntrySpec>,
    },
    RangeTypeMap {
        range: (usize, usize),
        map: Vec<TypeMapEntrySpec>,
    },
    FirstLayerTypeMap {
        map: Vec<TypeMapEntrySpec>,
    },
    LastLayerTypeMap {
        map: Vec<TypeMapEntrySpec>,
    },
    FirstNTypeMap {
        n: usize,
        map: Vec<TypeMapEntrySpec>,
    },
}

/// The specification for the `Composite` struct, either a preset or a list of primitives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeSpec {
    /// The same rule on every layer.
    Uniform { rule: RuleSpec },
    EpsilonGammaBox { low: f32, high: f32 },
    EpsilonPlus,
    EpsilonAlpha2Beta1,
    EpsilonPlusFlat,
    EpsilonAlpha2Beta1Flat,
    Primitives { primitives: Vec<PrimitiveSpec> },
}
