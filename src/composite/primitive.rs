use std::ops::RangeInclusive;

use super::TypeMap;
use crate::{arch::layers::Layer, rules::Rule};

/// A single step of a [`Composite`](super::Composite).
///
/// Indices are 1-based top-level positions of the model. A primitive that matches a position
/// assigns every layer nested below it.
#[derive(Clone, Debug)]
pub enum Primitive {
    LayerMap { index: usize, rule: Rule },
    GlobalMap(Rule),
    RangeMap { range: RangeInclusive<usize>, rule: Rule },
    /// The layers that read the model input.
    FirstLayerMap(Rule),
    /// The layers that produce the model output.
    LastLayerMap(Rule),
    GlobalTypeMap(TypeMap),
    RangeTypeMap { range: RangeInclusive<usize>, map: TypeMap },
    FirstLayerTypeMap(TypeMap),
    LastLayerTypeMap(TypeMap),
    FirstNTypeMap { n: usize, map: TypeMap },
}
use Primitive::*;

/// Where a layer sits in the model, as far as primitives are concerned.
pub(super) struct Site<'a> {
    pub path: &'a [usize],
    pub layer: &'a Layer,
    pub first: bool,
    pub last: bool,
}

impl Primitive {
    /// Returns the rule this primitive assigns at `site`, if it matches it.
    pub(super) fn rule_for(&self, site: &Site) -> Option<Rule> {
        let index = site.path.first().copied().unwrap_or_default();
        let by_type = |map: &TypeMap| map.get(&site.layer.layer_type()).cloned();

        match self {
            LayerMap { index: i, rule } => (*i == index).then(|| rule.clone()),
            GlobalMap(rule) => Some(rule.clone()),
            RangeMap { range, rule } => range.contains(&index).then(|| rule.clone()),
            FirstLayerMap(rule) => site.first.then(|| rule.clone()),
            LastLayerMap(rule) => site.last.then(|| rule.clone()),
            GlobalTypeMap(map) => by_type(map),
            RangeTypeMap { range, map } => range.contains(&index).then(|| by_type(map)).flatten(),
            FirstLayerTypeMap(map) => site.first.then(|| by_type(map)).flatten(),
            LastLayerTypeMap(map) => site.last.then(|| by_type(map)).flatten(),
            FirstNTypeMap { n, map } => (index <= *n).then(|| by_type(map)).flatten(),
        }
    }
}
