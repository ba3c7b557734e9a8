/// A user-defined elementwise activation.
///
/// The name is the identity under which the activation is registered as
/// supported, see [`Registry::register_activation`](crate::checks::Registry::register_activation).
pub trait CustomActivation: Send + Sync {
    fn name(&self) -> &str;

    fn f(&self, x: f32) -> f32;

    fn df(&self, x: f32) -> f32;
}
