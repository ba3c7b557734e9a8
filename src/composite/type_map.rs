use crate::{
    arch::layers::{LayerGroup, LayerType},
    rules::Rule,
};

/// Matches a layer either by its exact type or by the family it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeMatch {
    Type(LayerType),
    Group(LayerGroup),
}

impl TypeMatch {
    pub fn matches(&self, ty: &LayerType) -> bool {
        match self {
            TypeMatch::Type(t) => t == ty,
            TypeMatch::Group(g) => g.contains(ty),
        }
    }
}

impl From<LayerType> for TypeMatch {
    fn from(ty: LayerType) -> Self {
        TypeMatch::Type(ty)
    }
}

impl From<LayerGroup> for TypeMatch {
    fn from(group: LayerGroup) -> Self {
        TypeMatch::Group(group)
    }
}

/// An ordered mapping from layer types to rules, the first matching entry wins.
#[derive(Clone, Debug, Default)]
pub struct TypeMap {
    entries: Vec<(TypeMatch, Rule)>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, consulted after every entry already present.
    pub fn with<T>(mut self, ty: T, rule: Rule) -> Self
    where
        T: Into<TypeMatch>,
    {
        self.entries.push((ty.into(), rule));
        self
    }

    pub fn get(&self, ty: &LayerType) -> Option<&Rule> {
        self.entries
            .iter()
            .find(|(matcher, _)| matcher.matches(ty))
            .map(|(_, rule)| rule)
    }
}

impl<T> FromIterator<(T, Rule)> for TypeMap
where
    T: Into<TypeMatch>,
{
    fn from_iter<I: IntoIterator<Item = (T, Rule)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(t, r)| (t.into(), r)).collect(),
        }
    }
}
