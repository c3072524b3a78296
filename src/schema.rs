//! Schema declaration table.
//!
//! Every example type carries a static description of its members, produced by
//! `#[derive(FeatureExample)]` (or written by hand). [`FeatureExample::declare`] fills a
//! [`SchemaDeclaration`] once per compilation; the extractor then walks it to build the
//! flattened descriptor list.
//!
//! ```rust
//! use featwire::rt::probe::*;
//! use featwire::schema::{Access, FeatureAttr, SchemaDeclaration};
//! use featwire::FeatureExample;
//!
//! struct Listing {
//!     price: f32,
//!     city: Option<String>,
//! }
//!
//! impl FeatureExample for Listing {
//!     fn declare(schema: &mut SchemaDeclaration<Self>) {
//!         schema.feature(
//!             FeatureAttr::named("price").namespace("p"),
//!             Access::required("price", |root: &Self| Some(&root.price)),
//!             (&&&&&&&&Probe::<f32>::new()).member_kind(),
//!             None,
//!         );
//!         schema.feature(
//!             FeatureAttr::named("city").namespace("loc"),
//!             Access::optional("city", |root: &Self| root.city.as_ref()),
//!             (&&&&&&&&Probe::<String>::new()).member_kind(),
//!             None,
//!         );
//!     }
//! }
//! ```
//!
//! The probe ladder in [`crate::rt::probe`] picks the built-in marshaller matching each
//! member's shape; the derive macro emits exactly these calls.

use std::any::Any;
use std::fmt;

use crate::compile::{CandidateLines, OutputKind, bind_candidates};
use crate::descriptor::{FeatureDescriptor, Guard, StringProcessing, ValueShape, ValueType, accessor};
use crate::engine::Label;
use crate::error::Result;
use crate::extract::ensure_not_expanding;
use crate::marshal::{MarshallerHandle, MarshallerRegistry};
use crate::text::escape;

/// A record type whose members describe features.
///
/// Usually derived with `#[derive(FeatureExample)]`.
pub trait FeatureExample: Sized + Send + Sync + 'static {
    /// Declares the members of `Self` in declaration order.
    fn declare(schema: &mut SchemaDeclaration<Self>);
}

/// A unit enum marshalled as one categorical indicator per variant.
///
/// Usually derived with `#[derive(FeatureEnum)]`.
pub trait FeatureEnum: Send + Sync + 'static {
    /// Variant names, indexed by [`FeatureEnum::variant_index`].
    fn variants() -> &'static [&'static str];

    /// Index of `self` into [`FeatureEnum::variants`].
    fn variant_index(&self) -> usize;
}

/// Namespace and group inherited by nested members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    /// Inherited namespace name.
    pub namespace: Option<&'static str>,
    /// Inherited feature group.
    pub group: Option<char>,
}

impl Scope {
    /// The scope of an example root: default namespace, no group.
    pub fn root() -> Self {
        Self::default()
    }

    /// The scope seen by a member declared with `attr`.
    pub fn enter(self, attr: Option<&FeatureAttr>) -> Self {
        match attr {
            Some(attr) => Self {
                namespace: attr.namespace.or(self.namespace),
                group: attr.group.or(self.group),
            },
            None => self,
        }
    }
}

/// Member-level feature annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureAttr {
    /// Feature name. Empty means "use the member path".
    pub name: &'static str,
    /// Namespace override.
    pub namespace: Option<&'static str>,
    /// Feature group override.
    pub group: Option<char>,
    /// Emission order inside the namespace (default 0).
    pub order: Option<i32>,
    /// Expand the value into `{name}{value}` indicators.
    pub enumerize: bool,
    /// Prepend an anchor at index 0 of a dense vector.
    pub add_anchor: bool,
    /// Memoize renderings per value.
    pub dictify: bool,
    /// String processing for `Display` values.
    pub strings: Option<StringProcessing>,
}

impl FeatureAttr {
    /// Attributes with only a name.
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Sets the namespace.
    pub fn namespace(mut self, namespace: &'static str) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Sets the feature group.
    pub fn group(mut self, group: char) -> Self {
        self.group = Some(group);
        self
    }

    /// Sets the emission order.
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}

/// How to reach a member of type `T` from a value of type `R`.
pub struct Access<R, T: ?Sized> {
    pub(crate) path: &'static str,
    pub(crate) get: for<'a> fn(&'a R) -> Option<&'a T>,
    pub(crate) optional: bool,
}

impl<R, T: ?Sized> Clone for Access<R, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, T: ?Sized> Copy for Access<R, T> {}

impl<R, T: ?Sized> Access<R, T> {
    /// A member that is always present.
    pub fn required(path: &'static str, get: for<'a> fn(&'a R) -> Option<&'a T>) -> Self {
        Self {
            path,
            get,
            optional: false,
        }
    }

    /// An `Option` member; a `None` suppresses the member and everything below it.
    pub fn optional(path: &'static str, get: for<'a> fn(&'a R) -> Option<&'a T>) -> Self {
        Self {
            path,
            get,
            optional: true,
        }
    }

    /// Member path.
    pub fn path(&self) -> &'static str {
        self.path
    }
}

/// Renders a value as text, used by enumerized and memoized features.
pub type Render = fn(&dyn Any) -> Option<String>;

/// The leaf classification of a member type.
#[derive(Clone)]
pub struct LeafKind {
    shape: ValueShape,
    marshaller: Option<MarshallerHandle>,
    render: Option<Render>,
    variants: &'static [&'static str],
}

impl fmt::Debug for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafKind")
            .field("shape", &self.shape)
            .field("has_marshaller", &self.marshaller.is_some())
            .field("has_render", &self.render.is_some())
            .field("variants", &self.variants)
            .finish()
    }
}

impl LeafKind {
    /// A leaf with no default marshaller.
    pub fn new(shape: ValueShape) -> Self {
        Self {
            shape,
            marshaller: None,
            render: None,
            variants: &[],
        }
    }

    /// Attaches the built-in marshaller for this shape.
    pub fn with_marshaller(mut self, marshaller: MarshallerHandle) -> Self {
        self.marshaller = Some(marshaller);
        self
    }

    /// Attaches a text rendering.
    pub fn with_render(mut self, render: Render) -> Self {
        self.render = Some(render);
        self
    }

    /// Attaches enum variant names.
    pub fn with_variants(mut self, variants: &'static [&'static str]) -> Self {
        self.variants = variants;
        self
    }

    /// Shape classification.
    pub fn shape(&self) -> ValueShape {
        self.shape
    }

    /// Built-in marshaller, if the shape has one.
    pub fn marshaller(&self) -> Option<&MarshallerHandle> {
        self.marshaller.as_ref()
    }

    /// Text rendering, if the type has one.
    pub fn render(&self) -> Option<Render> {
        self.render
    }

    /// Enum variant names (empty for non-enums).
    pub fn variants(&self) -> &'static [&'static str] {
        self.variants
    }
}

/// What a member type contributes: nested features, or a single leaf.
pub enum MemberKind<T> {
    /// The type declares its own features.
    Nested(fn(&Scope) -> Result<Vec<FeatureDescriptor<T>>>),
    /// The type is marshalled as one feature.
    Leaf(LeafKind),
}

impl<T> fmt::Debug for MemberKind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nested(_) => f.write_str("Nested"),
            Self::Leaf(leaf) => f.debug_tuple("Leaf").field(leaf).finish(),
        }
    }
}

pub(crate) type NestedSource<R> =
    Box<dyn Fn(&Scope) -> Result<Vec<FeatureDescriptor<R>>> + Send + Sync>;

pub(crate) type LabelReader<R> =
    Box<dyn for<'a> Fn(&'a R) -> Option<&'a dyn Label> + Send + Sync>;

pub(crate) type CandidateBinder<R> =
    Box<dyn Fn(OutputKind, &MarshallerRegistry) -> Result<Box<dyn CandidateLines<R>>> + Send + Sync>;

pub(crate) struct DeclaredMember<R> {
    pub(crate) path: &'static str,
    pub(crate) attr: Option<FeatureAttr>,
    pub(crate) nested: Option<NestedSource<R>>,
    pub(crate) leaf: Option<FeatureDescriptor<R>>,
}

pub(crate) struct LabelMember<R> {
    pub(crate) path: &'static str,
    pub(crate) read: LabelReader<R>,
}

pub(crate) struct ActionMember<R> {
    pub(crate) path: &'static str,
    pub(crate) candidate: &'static str,
    pub(crate) bind: CandidateBinder<R>,
}

/// Declaration table filled by [`FeatureExample::declare`].
pub struct SchemaDeclaration<R> {
    pub(crate) members: Vec<DeclaredMember<R>>,
    pub(crate) labels: Vec<LabelMember<R>>,
    pub(crate) actions: Vec<ActionMember<R>>,
}

impl<R> fmt::Debug for SchemaDeclaration<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDeclaration")
            .field(
                "members",
                &self.members.iter().map(|m| m.path).collect::<Vec<_>>(),
            )
            .field(
                "labels",
                &self.labels.iter().map(|l| l.path).collect::<Vec<_>>(),
            )
            .field(
                "actions",
                &self.actions.iter().map(|a| a.path).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn label_reader<R, F>(f: F) -> LabelReader<R>
where
    F: for<'a> Fn(&'a R) -> Option<&'a dyn Label> + Send + Sync + 'static,
{
    Box::new(f)
}

impl<R: FeatureExample> SchemaDeclaration<R> {
    /// Runs `R::declare` on an empty table.
    pub fn collect() -> Self {
        let mut schema = Self {
            members: Vec::new(),
            labels: Vec::new(),
            actions: Vec::new(),
        };
        R::declare(&mut schema);
        schema
    }

    /// Declares an annotated feature member.
    ///
    /// `with` binds a marshaller directly to the member, ahead of any registry entry.
    pub fn feature<T: 'static>(
        &mut self,
        attr: FeatureAttr,
        access: Access<R, T>,
        kind: MemberKind<T>,
        with: Option<MarshallerHandle>,
    ) {
        let Access {
            path,
            get,
            optional,
        } = access;

        let (nested, leaf) = match kind {
            MemberKind::Nested(source) => (
                Some(nested_source(path, optional, get, source)),
                LeafKind::new(ValueShape::Nested),
            ),
            MemberKind::Leaf(leaf) => (None, leaf),
        };

        let name = if attr.name.is_empty() { path } else { attr.name };
        let guards = if optional {
            vec![Guard::new(path, move |root: &R| get(root).is_some())]
        } else {
            Vec::new()
        };

        let descriptor = FeatureDescriptor {
            name: escape(name).into_owned(),
            path: path.to_owned(),
            value_type: ValueType::of::<T>(),
            namespace: attr.namespace,
            group: attr.group,
            order: attr.order.unwrap_or(0),
            enumerize: attr.enumerize,
            add_anchor: attr.add_anchor,
            dictify: attr.dictify,
            strings: attr.strings.unwrap_or_default(),
            guards,
            accessor: accessor(move |root: &R| get(root).map(|value| value as &dyn Any)),
            leaf,
            override_marshaller: with,
        };

        self.members.push(DeclaredMember {
            path,
            attr: Some(attr),
            nested,
            leaf: Some(descriptor),
        });
    }

    /// Declares an unannotated member. It contributes the features of its type, if any.
    pub fn nested<T: 'static>(&mut self, access: Access<R, T>, kind: MemberKind<T>) {
        if let MemberKind::Nested(source) = kind {
            let Access {
                path,
                get,
                optional,
            } = access;
            self.members.push(DeclaredMember {
                path,
                attr: None,
                nested: Some(nested_source(path, optional, get, source)),
                leaf: None,
            });
        }
    }

    /// Declares the member holding this example's label.
    pub fn label<L: Label + 'static>(&mut self, access: Access<R, L>) {
        let get = access.get;
        self.labels.push(LabelMember {
            path: access.path,
            read: label_reader(move |root: &R| get(root).map(|label| label as &dyn Label)),
        });
    }

    /// Declares the per-candidate collection of a multi-line example.
    pub fn action_dependent<C: FeatureExample>(&mut self, access: Access<R, Vec<C>>) {
        let get = access.get;
        self.actions.push(ActionMember {
            path: access.path,
            candidate: std::any::type_name::<C>(),
            bind: Box::new(move |kind, registry| bind_candidates::<R, C>(get, kind, registry)),
        });
    }

    /// Member paths in declaration order.
    pub fn member_paths(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.members.iter().map(|member| member.path)
    }
}

fn nested_source<R: 'static, T: 'static>(
    path: &'static str,
    optional: bool,
    get: for<'a> fn(&'a R) -> Option<&'a T>,
    source: fn(&Scope) -> Result<Vec<FeatureDescriptor<T>>>,
) -> NestedSource<R> {
    Box::new(move |scope| {
        ensure_not_expanding::<T>(path)?;
        Ok(source(scope)?
            .into_iter()
            .map(|descriptor| descriptor.rebase(path, optional, get))
            .collect())
    })
}
