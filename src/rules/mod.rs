mod assignment;
mod custom;
mod modified;
mod rule;

pub use assignment::Rules;
pub use custom::CustomRule;
pub(crate) use modified::{Modified, ModifiedLayer};
pub use rule::{stabilize, Rule, DEFAULT_EPSILON, DEFAULT_GAMMA, DEFAULT_STABILIZER};
