//! Marshallers and marshal-method resolution.
//!
//! A marshaller turns one feature value into engine features through the
//! [`MarshalContext`]. Each descriptor is bound to exactly one marshaller when a serializer
//! is compiled, in priority order:
//!
//! 1. a member-level override (`#[featwire(with = path)]`),
//! 2. an entry for the value type in the caller's [`MarshallerRegistry`],
//! 3. the built-in marshaller picked by the shape probe.
//!
//! Shape traits ([`NumericFeature`], [`DenseFeature`], [`DictionaryFeature`],
//! [`BagFeature`]) decide which built-in applies. Implement them for your own types to
//! reuse the built-ins.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::{self, Display};
use std::hash::BuildHasher;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

use crate::compile::OutputKind;
use crate::context::MarshalContext;
use crate::descriptor::{Feature, FeatureDescriptor, Namespace, StringProcessing};
use crate::error::SchemaError;
use crate::schema::{FeatureEnum, Render};
use crate::text::escape;

/// Marshals values of type `T`.
pub trait FeatureMarshaller<T: ?Sized>: Send + Sync {
    /// Writes the features of `value` into the open namespace of `ctx`.
    fn marshal(&self, ctx: &mut MarshalContext<'_>, namespace: &Namespace, feature: &Feature, value: &T);
}

/// Signature of a member-level marshal function (`#[featwire(with = path)]`).
pub type MarshalFn<T> = fn(&mut MarshalContext<'_>, &Namespace, &Feature, &T);

/// Type-erased marshaller, dispatched through `&dyn Any`.
pub(crate) trait DynMarshaller: Send + Sync {
    fn marshal_any(
        &self,
        ctx: &mut MarshalContext<'_>,
        namespace: &Namespace,
        feature: &Feature,
        value: &dyn Any,
    );

    fn describe(&self) -> &'static str;
}

struct Typed<T: ?Sized, M> {
    inner: M,
    _value: PhantomData<fn(&T)>,
}

impl<T: 'static, M: FeatureMarshaller<T>> DynMarshaller for Typed<T, M> {
    fn marshal_any(
        &self,
        ctx: &mut MarshalContext<'_>,
        namespace: &Namespace,
        feature: &Feature,
        value: &dyn Any,
    ) {
        match value.downcast_ref::<T>() {
            Some(value) => self.inner.marshal(ctx, namespace, feature, value),
            None => tracing::error!(
                feature = feature.path(),
                expected = std::any::type_name::<T>(),
                "marshaller bound to a feature of another type"
            ),
        }
    }

    fn describe(&self) -> &'static str {
        std::any::type_name::<M>()
    }
}

struct FnMarshaller<T: 'static>(MarshalFn<T>);

impl<T: 'static> FeatureMarshaller<T> for FnMarshaller<T> {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, namespace: &Namespace, feature: &Feature, value: &T) {
        (self.0)(ctx, namespace, feature, value);
    }
}

/// Shared handle to a marshaller bound to one value type.
#[derive(Clone)]
pub struct MarshallerHandle(Arc<dyn DynMarshaller>);

impl fmt::Debug for MarshallerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MarshallerHandle")
            .field(&self.0.describe())
            .finish()
    }
}

impl MarshallerHandle {
    /// Wraps a marshaller for values of type `T`.
    pub fn new<T: 'static, M: FeatureMarshaller<T> + 'static>(marshaller: M) -> Self {
        Self(Arc::new(Typed {
            inner: marshaller,
            _value: PhantomData,
        }))
    }

    /// Wraps a plain function.
    pub fn from_fn<T: 'static>(f: MarshalFn<T>) -> Self {
        Self::new::<T, _>(FnMarshaller(f))
    }

    pub(crate) fn erased<M: DynMarshaller + 'static>(marshaller: M) -> Self {
        Self(Arc::new(marshaller))
    }

    /// Marshals an erased value. Values of any other type than the bound one are ignored.
    pub fn marshal(
        &self,
        ctx: &mut MarshalContext<'_>,
        namespace: &Namespace,
        feature: &Feature,
        value: &dyn Any,
    ) {
        self.0.marshal_any(ctx, namespace, feature, value);
    }

    /// Type name of the wrapped marshaller.
    pub fn describe(&self) -> &'static str {
        self.0.describe()
    }

    /// Whether two handles share the same marshaller instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// --- REGISTRY ---

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// What makes two registrations interchangeable.
///
/// Zero-sized marshallers carry no state, so any two instances of the same type behave
/// alike. Anything else is identified by the registration itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum EntryIdentity {
    Stateless(TypeId),
    Instance(u64),
}

#[derive(Clone)]
struct RegistryEntry {
    handle: MarshallerHandle,
    identity: EntryIdentity,
}

/// Compiled serializers owned by one registry, keyed by `(example type, output kind)`.
pub(crate) type CompiledStore = RwLock<HashMap<(TypeId, OutputKind), Arc<dyn Any + Send + Sync>>>;

/// Caller-supplied marshallers, keyed by value type.
///
/// Registries made only of stateless (zero-sized) marshallers share compiled serializers
/// process-wide with every registry holding the same entries. A registry with a stateful
/// marshaller keeps its compiled serializers to itself; they are released with the last
/// clone of the registry.
#[derive(Clone, Default)]
pub struct MarshallerRegistry {
    entries: HashMap<TypeId, RegistryEntry>,
    owned: Arc<CompiledStore>,
}

impl fmt::Debug for MarshallerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshallerRegistry")
            .field("entries", &self.entries.len())
            .field("shared", &self.content_key().is_some())
            .finish()
    }
}

impl MarshallerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a marshaller for values of type `T`.
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register<T: 'static, M: FeatureMarshaller<T> + 'static>(&mut self, marshaller: M) -> &mut Self {
        let identity = if std::mem::size_of::<M>() == 0 {
            EntryIdentity::Stateless(TypeId::of::<M>())
        } else {
            EntryIdentity::Instance(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
        };
        self.entries.insert(
            TypeId::of::<T>(),
            RegistryEntry {
                handle: MarshallerHandle::new::<T, M>(marshaller),
                identity,
            },
        );
        // Serializers compiled against the previous contents no longer apply.
        self.owned = Arc::default();
        self
    }

    /// Looks up the marshaller registered for a value type.
    pub fn get(&self, value_type: TypeId) -> Option<&MarshallerHandle> {
        self.entries.get(&value_type).map(|entry| &entry.handle)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether serializers compiled against this registry may be shared process-wide.
    pub fn is_shareable(&self) -> bool {
        self.content_key().is_some()
    }

    /// Sorted `(value type, marshaller type)` pairs, when every entry is stateless.
    pub(crate) fn content_key(&self) -> Option<Vec<(TypeId, TypeId)>> {
        let mut key = self
            .entries
            .iter()
            .map(|(value, entry)| match entry.identity {
                EntryIdentity::Stateless(marshaller) => Some((*value, marshaller)),
                EntryIdentity::Instance(_) => None,
            })
            .collect::<Option<Vec<_>>>()?;
        key.sort_unstable();
        Some(key)
    }

    pub(crate) fn owned_store(&self) -> &CompiledStore {
        &self.owned
    }
}

// --- RESOLUTION ---

/// Where a descriptor's marshaller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Member-level `with` binding.
    Override,
    /// Entry in the caller's registry.
    Registered,
    /// Built-in per-value indicator expansion.
    Enumerized,
    /// Built-in marshaller for the value shape.
    BuiltIn,
}

/// Picks the marshaller for one descriptor.
///
/// # Errors
/// [`SchemaError::UnresolvedMarshaller`] when no source handles the value type.
pub fn resolve<R>(
    example: &'static str,
    descriptor: &FeatureDescriptor<R>,
    registry: &MarshallerRegistry,
) -> Result<(MarshallerHandle, Resolution), SchemaError> {
    if let Some(handle) = &descriptor.override_marshaller {
        return Ok((handle.clone(), Resolution::Override));
    }
    if let Some(handle) = registry.get(descriptor.value_type().id()) {
        return Ok((handle.clone(), Resolution::Registered));
    }
    if descriptor.enumerize() {
        if let Some(render) = descriptor.leaf.render() {
            return Ok((
                MarshallerHandle::erased(EnumerizeMarshaller { render }),
                Resolution::Enumerized,
            ));
        }
    } else if let Some(handle) = descriptor.leaf.marshaller() {
        return Ok((handle.clone(), Resolution::BuiltIn));
    }

    Err(SchemaError::UnresolvedMarshaller {
        example,
        member: descriptor.path().to_owned(),
        value_type: descriptor.value_type().name(),
    })
}

// --- SHAPES ---

/// Numeric scalars marshalled as one weighted feature.
pub trait NumericFeature: Display + Send + Sync + 'static {
    /// The feature weight.
    fn to_weight(&self) -> f64;

    /// `Some(flag)` for types marshalled as a bare indicator when set.
    fn indicator(&self) -> Option<bool> {
        None
    }
}

macro_rules! impl_numeric {
    ($($t:ty),*) => {
        $(
            impl NumericFeature for $t {
                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                fn to_weight(&self) -> f64 {
                    *self as f64
                }
            }
        )*
    }
}

impl_numeric!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl NumericFeature for bool {
    fn to_weight(&self) -> f64 {
        if *self { 1.0 } else { 0.0 }
    }

    fn indicator(&self) -> Option<bool> {
        Some(*self)
    }
}

/// Numeric sequences addressed by offset inside their namespace.
pub trait DenseFeature: Send + Sync + 'static {
    /// Number of elements.
    fn dense_len(&self) -> usize;

    /// Element weights, in index order.
    fn dense_weights(&self) -> impl Iterator<Item = f64> + '_;
}

impl<E: NumericFeature> DenseFeature for Vec<E> {
    fn dense_len(&self) -> usize {
        self.len()
    }

    fn dense_weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.iter().map(NumericFeature::to_weight)
    }
}

impl<E: NumericFeature> DenseFeature for Box<[E]> {
    fn dense_len(&self) -> usize {
        self.len()
    }

    fn dense_weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.iter().map(NumericFeature::to_weight)
    }
}

impl<E: NumericFeature, const N: usize> DenseFeature for [E; N] {
    fn dense_len(&self) -> usize {
        N
    }

    fn dense_weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.iter().map(NumericFeature::to_weight)
    }
}

impl<E: NumericFeature> DenseFeature for VecDeque<E> {
    fn dense_len(&self) -> usize {
        self.len()
    }

    fn dense_weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.iter().map(NumericFeature::to_weight)
    }
}

/// Key to weight mappings; each key becomes a feature.
pub trait DictionaryFeature: Send + Sync + 'static {
    /// Number of entries.
    fn entry_count(&self) -> usize;

    /// Visits every entry in iteration order.
    fn for_each_entry(&self, f: &mut dyn FnMut(&dyn Display, f64));
}

impl<K, V, S> DictionaryFeature for HashMap<K, V, S>
where
    K: Display + Send + Sync + 'static,
    V: NumericFeature,
    S: BuildHasher + Send + Sync + 'static,
{
    fn entry_count(&self) -> usize {
        self.len()
    }

    fn for_each_entry(&self, f: &mut dyn FnMut(&dyn Display, f64)) {
        for (key, value) in self {
            f(key, value.to_weight());
        }
    }
}

impl<K, V> DictionaryFeature for BTreeMap<K, V>
where
    K: Display + Send + Sync + 'static,
    V: NumericFeature,
{
    fn entry_count(&self) -> usize {
        self.len()
    }

    fn for_each_entry(&self, f: &mut dyn FnMut(&dyn Display, f64)) {
        for (key, value) in self {
            f(key, value.to_weight());
        }
    }
}

impl<K, V> DictionaryFeature for Vec<(K, V)>
where
    K: Display + Send + Sync + 'static,
    V: NumericFeature,
{
    fn entry_count(&self) -> usize {
        self.len()
    }

    fn for_each_entry(&self, f: &mut dyn FnMut(&dyn Display, f64)) {
        for (key, value) in self {
            f(key, value.to_weight());
        }
    }
}

/// Collections whose items each become an indicator.
pub trait BagFeature: Send + Sync + 'static {
    /// Number of items.
    fn item_count(&self) -> usize;

    /// Visits every item in iteration order.
    fn for_each_item(&self, f: &mut dyn FnMut(&dyn Display));
}

impl<E: Display + Send + Sync + 'static> BagFeature for Vec<E> {
    fn item_count(&self) -> usize {
        self.len()
    }

    fn for_each_item(&self, f: &mut dyn FnMut(&dyn Display)) {
        self.iter().for_each(|item| f(item));
    }
}

impl<E, S> BagFeature for HashSet<E, S>
where
    E: Display + Send + Sync + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    fn item_count(&self) -> usize {
        self.len()
    }

    fn for_each_item(&self, f: &mut dyn FnMut(&dyn Display)) {
        self.iter().for_each(|item| f(item));
    }
}

impl<E: Display + Send + Sync + 'static> BagFeature for BTreeSet<E> {
    fn item_count(&self) -> usize {
        self.len()
    }

    fn for_each_item(&self, f: &mut dyn FnMut(&dyn Display)) {
        self.iter().for_each(|item| f(item));
    }
}

// --- BUILT-INS ---

/// `name:value`, or a bare `name` for set indicators.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericMarshaller;

impl<T: NumericFeature> FeatureMarshaller<T> for NumericMarshaller {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, feature: &Feature, value: &T) {
        match value.indicator() {
            Some(true) => ctx.add_indicator(feature.name()),
            Some(false) => {}
            None => ctx.add_weighted(feature.name(), value.to_weight()),
        }
    }
}

/// One `{name}{variant}` indicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumMarshaller;

impl<T: FeatureEnum> FeatureMarshaller<T> for EnumMarshaller {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, feature: &Feature, value: &T) {
        if let Some(token) = feature.variant_token(value.variant_index()) {
            ctx.add_indicator(token);
        }
    }
}

/// `index:value` pairs, optionally after an anchor at index 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseMarshaller;

impl<T: DenseFeature> FeatureMarshaller<T> for DenseMarshaller {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, feature: &Feature, value: &T) {
        ctx.preallocate(value.dense_len() + usize::from(feature.add_anchor()));
        ctx.add_dense(feature.add_anchor(), value.dense_weights());
    }
}

/// `key:weight` per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DictionaryMarshaller;

impl<T: DictionaryFeature> FeatureMarshaller<T> for DictionaryMarshaller {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, _: &Feature, value: &T) {
        ctx.preallocate(value.entry_count());
        value.for_each_entry(&mut |key, weight| {
            ctx.add_weighted(&escape(&key.to_string()), weight);
        });
    }
}

/// One indicator per item.
#[derive(Debug, Clone, Copy, Default)]
pub struct BagMarshaller;

impl<T: BagFeature> FeatureMarshaller<T> for BagMarshaller {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, _: &Feature, value: &T) {
        ctx.preallocate(value.item_count());
        value.for_each_item(&mut |item| {
            let rendered = item.to_string();
            if !rendered.is_empty() {
                ctx.add_indicator(&escape(&rendered));
            }
        });
    }
}

/// The `Display` rendering, tokenized per [`StringProcessing`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayMarshaller;

impl<T: Display + Send + Sync + 'static> FeatureMarshaller<T> for DisplayMarshaller {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, feature: &Feature, value: &T) {
        let rendered = ctx.rendered(feature, value, || value.to_string());
        match feature.string_processing() {
            StringProcessing::Split => {
                for word in rendered.split_whitespace() {
                    ctx.add_indicator(&escape(word));
                }
            }
            StringProcessing::Escape => {
                if !rendered.is_empty() {
                    ctx.add_indicator(&escape(&rendered));
                }
            }
            StringProcessing::EscapeAndIncludeName => {
                ctx.add_indicator(&format!("{}{}", feature.name(), escape(&rendered)));
            }
        }
    }
}

/// `{name}{value}` per distinct value.
#[derive(Clone, Copy)]
pub(crate) struct EnumerizeMarshaller {
    render: Render,
}

impl DynMarshaller for EnumerizeMarshaller {
    fn marshal_any(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, feature: &Feature, value: &dyn Any) {
        let render = self.render;
        let rendered = ctx.rendered(feature, value, || render(value).unwrap_or_default());
        ctx.add_indicator(&format!("{}{}", feature.name(), escape(&rendered)));
    }

    fn describe(&self) -> &'static str {
        "featwire::marshal::EnumerizeMarshaller"
    }
}
