use std::{collections::HashSet, sync::OnceLock};

use parking_lot::RwLock;

use crate::arch::{
    activations::ActFn,
    layers::{Layer, LayerType},
};

/// Records which layers and activation functions LRP may propagate through.
///
/// Affine, pooling, reshaping and dropout layers, as well as the ReLU family of activations, are
/// always supported. Everything else has to be registered explicitly, by type for layers and by
/// name for activations. Registrations only ever add entries.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    layers: HashSet<LayerType>,
    activations: HashSet<String>,
}

impl Registry {
    /// A registry holding only the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_layer(&mut self, ty: LayerType) {
        self.layers.insert(ty);
    }

    pub fn register_activation(&mut self, name: impl Into<String>) {
        self.activations.insert(name.into());
    }

    pub fn supports_layer(&self, layer: &Layer) -> bool {
        match layer {
            Layer::Function(act_fn) if act_fn.is_relu_like() => true,
            Layer::Function(_) | Layer::Custom(_) => self.layers.contains(&layer.layer_type()),
            _ => true,
        }
    }

    pub fn supports_activation(&self, act_fn: &ActFn) -> bool {
        act_fn.is_relu_like() || self.activations.contains(act_fn.name())
    }

    /// A snapshot of the process-wide registry.
    pub fn global() -> Registry {
        global().read().clone()
    }
}

fn global() -> &'static RwLock<Registry> {
    static GLOBAL: OnceLock<RwLock<Registry>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Registry::new()))
}

/// Marks a layer type as supported for every analyzer built afterwards from the global registry.
///
/// Registration should happen at start-up, before analyzers are built concurrently: an analyzer
/// built while another thread registers may or may not see the new entry.
pub fn register_layer_supported(ty: LayerType) {
    global().write().register_layer(ty);
}

/// Marks an activation function as supported, see [`register_layer_supported`].
pub fn register_activation_supported(name: impl Into<String>) {
    global().write().register_activation(name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrations_extend_the_defaults() {
        let mut registry = Registry::new();
        let tanh = Layer::function(ActFn::Tanh);

        assert!(registry.supports_layer(&Layer::function(ActFn::Relu)));
        assert!(!registry.supports_layer(&tanh));
        assert!(!registry.supports_activation(&ActFn::Tanh));

        registry.register_layer(LayerType::function("tanh"));
        assert!(registry.supports_layer(&tanh));
        assert!(!registry.supports_activation(&ActFn::Tanh));

        registry.register_activation("tanh");
        assert!(registry.supports_activation(&ActFn::Tanh));
    }

    #[test]
    fn global_registrations_show_up_in_snapshots() {
        register_activation_supported("registry-test-activation");

        assert!(Registry::global()
            .activations
            .contains("registry-test-activation"));
    }
}
