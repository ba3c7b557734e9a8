use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// The attribution method an [`Explanation`] was computed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Lrp,
}

/// How channels are collapsed into a single heatmap value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduce {
    Sum,
}

/// How heatmap values are mapped onto the color scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeScale {
    /// Symmetric around zero, so that positive and negative relevance read apart.
    Centered,
}

/// Rendering defaults for a heatmap of an explanation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HeatmapPreset {
    pub reduce: Reduce,
    pub rangescale: RangeScale,
    pub colorscheme: &'static str,
}

impl Method {
    pub fn heatmap_preset(&self) -> HeatmapPreset {
        match self {
            Method::Lrp => HeatmapPreset {
                reduce: Reduce::Sum,
                rangescale: RangeScale::Centered,
                colorscheme: "seismic",
            },
        }
    }
}

/// Optional results that are only computed on request.
#[derive(Clone, Debug, Default)]
pub struct Extras {
    /// The relevance at the input and at the output of every top-level position, input first.
    pub layerwise_relevances: Option<Vec<ArrayD<f32>>>,
}

/// The result of an analysis.
#[derive(Clone, Debug)]
pub struct Explanation {
    /// The relevance of every input feature, shaped like the input.
    pub val: ArrayD<f32>,
    /// The raw model output.
    pub output: ArrayD<f32>,
    /// The selected output neuron of every sample.
    pub selected: Vec<usize>,
    pub method: Method,
    pub extras: Extras,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lrp_renders_summed_and_centered() {
        let preset = Method::Lrp.heatmap_preset();

        let json = serde_json::to_value(preset).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"reduce": "sum", "rangescale": "centered", "colorscheme": "seismic"})
        );
    }
}
