use serde::{Deserialize, Serialize};

/// Options for building an [`Lrp`](super::Lrp) analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LrpOptions {
    /// Skips every compatibility check, for experimental or unregistered architectures.
    pub skip_checks: bool,
    /// Inlines nested chains before resolving rules.
    pub flatten: bool,
    /// Attaches a per-layer summary to compatibility errors.
    pub verbose: bool,
}

impl Default for LrpOptions {
    fn default() -> Self {
        Self {
            skip_checks: false,
            flatten: true,
            verbose: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_their_defaults() {
        let options: LrpOptions = serde_json::from_str(r#"{ "skip_checks": true }"#).unwrap();

        assert_eq!(
            options,
            LrpOptions {
                skip_checks: true,
                flatten: true,
                verbose: true,
            }
        );
    }
}
