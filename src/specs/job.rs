use serde::{Deserialize, Serialize};

use super::{CompositeSpec, ModelSpec, TensorSpec};
use crate::{
    analyzer::LrpOptions,
    explanation::{Explanation, HeatmapPreset, Method},
};

/// The specification for the neuron selector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeuronSpec {
    #[default]
    MaxActivation,
    Index {
        index: usize,
    },
}

/// A complete analysis: the model, how its rules are chosen and the input to explain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub model: ModelSpec,
    pub composite: CompositeSpec,
    #[serde(default)]
    pub options: LrpOptions,
    /// Batched input, the batch axis first.
    pub input: TensorSpec,
    #[serde(default)]
    pub neuron: NeuronSpec,
    #[serde(default)]
    pub layerwise_relevances: bool,
}

/// The serialized form of an `Explanation`.
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationSpec {
    pub method: Method,
    pub heatmap: HeatmapPreset,
    pub selected: Vec<usize>,
    pub val: TensorSpec,
    pub output: TensorSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layerwise_relevances: Option<Vec<TensorSpec>>,
}

impl From<&Explanation> for ExplanationSpec {
    fn from(expl: &Explanation) -> Self {
        let tensor = |a: &ndarray::ArrayD<f32>| TensorSpec {
            shape: a.shape().to_vec(),
            data: a.iter().copied().collect(),
        };

        Self {
            method: expl.method,
            heatmap: expl.method.heatmap_preset(),
            selected: expl.selected.clone(),
            val: tensor(&expl.val),
            output: tensor(&expl.output),
            layerwise_relevances: expl
                .extras
                .layerwise_relevances
                .as_ref()
                .map(|rels| rels.iter().map(tensor).collect()),
        }
    }
}
