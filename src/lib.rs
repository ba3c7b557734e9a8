pub mod analyzer;
pub mod arch;
pub mod checks;
pub mod composite;
pub mod error;
pub mod explanation;
pub mod rules;
pub mod selector;
pub mod specs;

pub use analyzer::{Lrp, LrpOptions, RuleSource};
pub use checks::{register_activation_supported, register_layer_supported, Registry};
pub use error::{ErrorKind, LrpErr, Result};
pub use explanation::{Explanation, Method};
