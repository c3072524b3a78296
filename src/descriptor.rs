//! Feature and namespace descriptors.
//!
//! A [`FeatureDescriptor`] is the flattened, root-relative description of one feature of an
//! example type `R`: where its value lives, which guards must hold before the value can be
//! reached, and the metadata inherited from enclosing members. [`Namespace`] and [`Feature`]
//! are the runtime objects the compiled serializer hands to marshallers.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::marshal::MarshallerHandle;
use crate::schema::LeafKind;
use crate::text::{escape, escape_char};

/// Erased root-to-value accessor.
pub type Accessor<R> = Arc<dyn Fn(&R) -> Option<&dyn Any> + Send + Sync>;

/// Pins the higher-ranked signature of an accessor closure.
pub(crate) fn accessor<R, F>(f: F) -> Accessor<R>
where
    F: for<'a> Fn(&'a R) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identity of a feature value type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    /// Describes `T`.
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` used for marshaller lookup.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The Rust type name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType({})", self.name)
    }
}

/// Shape of a feature value, as classified when the schema is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueShape {
    /// Numeric scalar, emitted as `name:value`.
    Numeric,
    /// Unit enum, one indicator per variant.
    Enum,
    /// Contiguous numeric sequence addressed by offset.
    Dense,
    /// Key to numeric weight mapping.
    Dictionary,
    /// Collection of displayable items, one indicator each.
    Bag,
    /// Anything with a `Display` rendering.
    Display,
    /// A type carrying its own feature members.
    Nested,
    /// No built-in handling.
    Opaque,
}

impl ValueShape {
    /// Whether features of this shape occupy a dense namespace.
    pub fn is_dense(self) -> bool {
        matches!(self, Self::Dense)
    }
}

/// How a `Display` feature turns its rendering into tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringProcessing {
    /// One indicator per whitespace separated word.
    Split,
    /// A single indicator holding the escaped rendering.
    Escape,
    /// A single indicator `{name}{escaped rendering}`.
    #[default]
    EscapeAndIncludeName,
}

/// A non-null check along a member chain, evaluated before the feature value is read.
pub struct Guard<R> {
    path: String,
    check: Arc<dyn Fn(&R) -> bool + Send + Sync>,
}

impl<R> Clone for Guard<R> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            check: Arc::clone(&self.check),
        }
    }
}

impl<R> fmt::Debug for Guard<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guard({} is present)", self.path)
    }
}

impl<R: 'static> Guard<R> {
    pub(crate) fn new<F>(path: impl Into<String>, check: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            check: Arc::new(check),
        }
    }

    /// Evaluates the guard against a root instance.
    pub fn holds(&self, root: &R) -> bool {
        (self.check)(root)
    }

    /// Dotted member path this guard protects.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn rebase<P: 'static>(
        self,
        get: for<'a> fn(&'a P) -> Option<&'a R>,
        prefix: &str,
    ) -> Guard<P> {
        let check = self.check;
        Guard::new(format!("{prefix}.{}", self.path), move |parent: &P| {
            get(parent).is_some_and(|child| check(child))
        })
    }
}

/// Flattened description of one feature of the example type `R`.
pub struct FeatureDescriptor<R> {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) value_type: ValueType,
    pub(crate) namespace: Option<&'static str>,
    pub(crate) group: Option<char>,
    pub(crate) order: i32,
    pub(crate) enumerize: bool,
    pub(crate) add_anchor: bool,
    pub(crate) dictify: bool,
    pub(crate) strings: StringProcessing,
    pub(crate) guards: Vec<Guard<R>>,
    pub(crate) accessor: Accessor<R>,
    pub(crate) leaf: LeafKind,
    pub(crate) override_marshaller: Option<MarshallerHandle>,
}

impl<R> fmt::Debug for FeatureDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDescriptor")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("value_type", &self.value_type)
            .field("namespace", &self.namespace)
            .field("group", &self.group)
            .field("order", &self.order)
            .field("shape", &self.leaf.shape())
            .field("guards", &self.guards)
            .finish_non_exhaustive()
    }
}

impl<R> FeatureDescriptor<R> {
    /// Feature name used for hashing (escaped).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted member path from the root type.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Shape classification of the value type.
    pub fn shape(&self) -> ValueShape {
        self.leaf.shape()
    }

    /// Namespace name, if any was declared or inherited.
    pub fn namespace(&self) -> Option<&'static str> {
        self.namespace
    }

    /// Feature group tag, if any was declared or inherited.
    pub fn group(&self) -> Option<char> {
        self.group
    }

    /// Intra-namespace emission order.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Whether values expand into one indicator per distinct value.
    pub fn enumerize(&self) -> bool {
        self.enumerize
    }

    /// Whether dense vectors get an anchor feature at index 0.
    pub fn add_anchor(&self) -> bool {
        self.add_anchor
    }

    /// Whether renderings are memoized per value in the marshal context.
    pub fn dictify(&self) -> bool {
        self.dictify
    }

    /// Validity guards, root to leaf.
    pub fn guards(&self) -> &[Guard<R>] {
        &self.guards
    }

    /// Whether any member along the chain to this feature is optional.
    pub fn is_nullable_chain(&self) -> bool {
        !self.guards.is_empty()
    }

    /// Whether the descriptor carries a member-level marshaller override.
    pub fn has_override(&self) -> bool {
        self.override_marshaller.is_some()
    }
}

impl<R: 'static> FeatureDescriptor<R> {
    /// Reads the feature value from a root instance, evaluating the guards first.
    pub fn value<'a>(&self, root: &'a R) -> Option<&'a dyn Any> {
        if self.guards.iter().all(|guard| guard.holds(root)) {
            (self.accessor)(root)
        } else {
            None
        }
    }

    /// Re-roots this descriptor one member up: `P.member` holds the current root.
    pub(crate) fn rebase<P: 'static>(
        self,
        member: &'static str,
        optional: bool,
        get: for<'a> fn(&'a P) -> Option<&'a R>,
    ) -> FeatureDescriptor<P> {
        let child = self.accessor;
        let accessor = accessor(move |parent: &P| get(parent).and_then(|value| child(value)));

        let mut guards = Vec::with_capacity(self.guards.len() + 1);
        if optional {
            guards.push(Guard::new(member, move |parent: &P| get(parent).is_some()));
        }
        guards.extend(self.guards.into_iter().map(|guard| guard.rebase(get, member)));

        FeatureDescriptor {
            name: self.name,
            path: format!("{member}.{}", self.path),
            value_type: self.value_type,
            namespace: self.namespace,
            group: self.group,
            order: self.order,
            enumerize: self.enumerize,
            add_anchor: self.add_anchor,
            dictify: self.dictify,
            strings: self.strings,
            guards,
            accessor,
            leaf: self.leaf,
            override_marshaller: self.override_marshaller,
        }
    }
}

/// Runtime namespace descriptor handed to marshallers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: Option<String>,
    group: Option<char>,
    full: String,
    header: String,
    index: char,
}

impl Namespace {
    /// Builds the namespace for a `(name, group)` pair. Both are escaped.
    pub fn new(name: Option<&str>, group: Option<char>) -> Self {
        let name = name.map(|n| escape(n).into_owned());
        let group = group.map(escape_char);
        let mut full = String::new();
        if let Some(group) = group {
            full.push(group);
        }
        if let Some(name) = &name {
            full.push_str(name);
        }
        let header = format!("|{full}");
        let index = full.chars().next().unwrap_or(' ');
        Self {
            name,
            group,
            full,
            header,
            index,
        }
    }

    /// Declared namespace name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Feature group tag.
    pub fn group(&self) -> Option<char> {
        self.group
    }

    /// `{group}{name}`, the string the engine hashes.
    pub fn full_name(&self) -> &str {
        &self.full
    }

    /// Text header, `|{group}{name}`.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Engine namespace index (first character, or a space for the default namespace).
    pub fn index(&self) -> char {
        self.index
    }
}

/// Runtime feature descriptor handed to marshallers.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    name: String,
    path: String,
    order: i32,
    enumerize: bool,
    add_anchor: bool,
    dictify: bool,
    strings: StringProcessing,
    variant_tokens: Vec<String>,
}

impl Feature {
    pub(crate) fn from_descriptor<R>(descriptor: &FeatureDescriptor<R>) -> Self {
        let variant_tokens = descriptor
            .leaf
            .variants()
            .iter()
            .map(|variant| format!("{}{}", descriptor.name, escape(variant)))
            .collect();
        Self {
            name: descriptor.name.clone(),
            path: descriptor.path.clone(),
            order: descriptor.order,
            enumerize: descriptor.enumerize,
            add_anchor: descriptor.add_anchor,
            dictify: descriptor.dictify,
            strings: descriptor.strings,
            variant_tokens,
        }
    }

    /// A standalone feature, mostly useful for exercising custom marshallers.
    pub fn named(name: &str) -> Self {
        Self {
            name: escape(name).into_owned(),
            path: name.to_owned(),
            order: 0,
            enumerize: false,
            add_anchor: false,
            dictify: false,
            strings: StringProcessing::default(),
            variant_tokens: Vec::new(),
        }
    }

    /// Escaped feature name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted member path from the example root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Emission order inside the namespace.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// See [`FeatureDescriptor::enumerize`].
    pub fn enumerize(&self) -> bool {
        self.enumerize
    }

    /// See [`FeatureDescriptor::add_anchor`].
    pub fn add_anchor(&self) -> bool {
        self.add_anchor
    }

    /// See [`FeatureDescriptor::dictify`].
    pub fn dictify(&self) -> bool {
        self.dictify
    }

    /// String processing mode for `Display` values.
    pub fn string_processing(&self) -> StringProcessing {
        self.strings
    }

    /// Precomputed `{name}{variant}` token for an enum variant index.
    pub fn variant_token(&self, index: usize) -> Option<&str> {
        self.variant_tokens.get(index).map(String::as_str)
    }
}
