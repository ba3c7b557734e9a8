use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, LrpErr>;

/// Broad classification of an [`LrpErr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while building an analyzer. Never retried.
    Configuration,
    /// Raised while running an analysis on an incompatible input.
    Shape,
}

/// The crate's error type.
#[derive(Debug)]
pub enum LrpErr {
    UnknownLayer {
        position: String,
        layer: String,
        table: Option<String>,
    },
    UnknownActivation {
        position: String,
        activation: String,
        table: Option<String>,
    },
    SoftmaxOutput {
        activation: String,
    },
    UnresolvedRule {
        position: String,
    },
    RuleShapeMismatch {
        position: String,
    },
    IncompatibleRule {
        position: String,
        rule: String,
        layer: String,
    },
    ConflictingModification {
        position: String,
        rule: String,
    },
    InvalidRule {
        rule: &'static str,
        reason: String,
    },
    UnsupportedMerge {
        merge: String,
    },
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: String,
    },
    InvalidNeuron {
        index: usize,
        len: usize,
    },
}

impl LrpErr {
    /// Returns whether this is a construction-time or an analysis-time failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LrpErr::ShapeMismatch { .. } | LrpErr::InvalidNeuron { .. } => ErrorKind::Shape,
            _ => ErrorKind::Configuration,
        }
    }

    pub(crate) fn shape(what: &'static str, got: &[usize], expected: impl Into<String>) -> Self {
        LrpErr::ShapeMismatch {
            what,
            got: got.to_vec(),
            expected: expected.into(),
        }
    }
}

impl Display for LrpErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LrpErr::UnknownLayer {
                position,
                layer,
                table,
            } => {
                write!(
                    f,
                    "unknown layer `{layer}` at position {position}, register it as supported or skip the checks"
                )?;
                if let Some(table) = table {
                    write!(f, "\n{table}")?;
                }
                Ok(())
            }
            LrpErr::UnknownActivation {
                position,
                activation,
                table,
            } => {
                write!(
                    f,
                    "unknown activation `{activation}` at position {position}, register it as supported or skip the checks"
                )?;
                if let Some(table) = table {
                    write!(f, "\n{table}")?;
                }
                Ok(())
            }
            LrpErr::SoftmaxOutput { activation } => write!(
                f,
                "the model output is normalized by `{activation}`, strip it from the model or skip the checks"
            ),
            LrpErr::UnresolvedRule { position } => {
                write!(f, "no rule could be determined for layer at position {position}")
            }
            LrpErr::RuleShapeMismatch { position } => write!(
                f,
                "the given rules do not match the structure of the model at position {position}"
            ),
            LrpErr::IncompatibleRule {
                position,
                rule,
                layer,
            } => write!(
                f,
                "rule {rule} cannot be applied to layer `{layer}` at position {position}"
            ),
            LrpErr::ConflictingModification { position, rule } => write!(
                f,
                "rule {rule} modifies both the layer and its parameters at position {position}"
            ),
            LrpErr::InvalidRule { rule, reason } => write!(f, "invalid {rule} rule: {reason}"),
            LrpErr::UnsupportedMerge { merge } => write!(
                f,
                "relevance cannot be split across a parallel block merged by {merge}"
            ),
            LrpErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got:?}, expected {expected}"),
            LrpErr::InvalidNeuron { index, len } => write!(
                f,
                "selected neuron {index} is out of bounds for an output of {len} neurons"
            ),
        }
    }
}

impl Error for LrpErr {}
