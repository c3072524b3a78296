//! The main entry point: configure once, then serialize examples.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use rayon::prelude::*;

use crate::cache::{CacheStats, DefaultComparer, ExampleCache, ExampleComparer, ResultCache};
use crate::compile::{CompiledSerializer, LabelTarget, OutputKind, compiled};
use crate::context::SerializedExample;
use crate::engine::FeatureEngine;
use crate::error::Result;
use crate::marshal::{FeatureMarshaller, MarshallerRegistry};
use crate::schema::FeatureExample;
use crate::settings::SerializerOptions;
use crate::text::FloatFormat;
use crate::validate::{ValidationReport, cross_validate};

/// The featwire facade.
///
/// ```rust
/// use std::sync::Arc;
/// use featwire::{Featwire, FeatureExample, ReferenceEngine};
///
/// #[derive(FeatureExample)]
/// struct Click {
///     #[featwire(namespace = "user", group = 'u')]
///     age: u32,
/// }
///
/// let serializer = Featwire::builder()
///     .text(true)
///     .build::<Click>(Arc::new(ReferenceEngine::new()))
///     .unwrap();
/// let out = serializer.serialize(&Click { age: 25 }).unwrap();
/// assert_eq!(out.text(), Some("|uuser age:25"));
/// ```
#[derive(Debug)]
pub struct Featwire;

impl Featwire {
    /// Starts a serializer configuration.
    pub fn builder() -> FeatwireBuilder {
        FeatwireBuilder::default()
    }
}

/// Configuration collected before building a [`Serializer`].
#[derive(Debug, Clone, Default)]
pub struct FeatwireBuilder {
    options: SerializerOptions,
    registry: MarshallerRegistry,
}

impl FeatwireBuilder {
    /// Produce the text form alongside the native one.
    pub fn text(mut self, enabled: bool) -> Self {
        self.options.text = enabled;
        self
    }

    /// Bounds the result cache of cached serializers.
    pub fn cache_max_entries(mut self, max: usize) -> Self {
        self.options.cache_max_entries = Some(max);
        self
    }

    /// Memoizes renderings of every `Display` and enumerized feature.
    pub fn dictify(mut self, enabled: bool) -> Self {
        self.options.dictify = enabled;
        self
    }

    /// Warns when a weight overflows `f32`.
    pub fn precision_warnings(mut self, enabled: bool) -> Self {
        self.options.precision_warnings = enabled;
        self
    }

    /// Float format of this serializer's text output.
    pub fn float_format(mut self, format: FloatFormat) -> Self {
        self.options.float_format = Some(format);
        self
    }

    /// Replaces every option at once, e.g. with values loaded from a config file.
    pub fn options(mut self, options: SerializerOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers a marshaller for every feature whose value type is `T`.
    pub fn marshaller<T: 'static, M: FeatureMarshaller<T> + 'static>(mut self, marshaller: M) -> Self {
        self.registry.register::<T, M>(marshaller);
        self
    }

    /// Builds an uncached serializer.
    ///
    /// # Errors
    /// Invalid options and schema errors of `T`.
    pub fn build<T: FeatureExample>(self, engine: Arc<dyn FeatureEngine>) -> Result<Serializer<T>> {
        self.finish(engine, None)
    }

    /// Builds a serializer caching results by `T`'s `Hash` and `Eq`.
    ///
    /// # Errors
    /// Invalid options and schema errors of `T`.
    pub fn build_cached<T>(self, engine: Arc<dyn FeatureEngine>) -> Result<Serializer<T>>
    where
        T: FeatureExample + Hash + Eq + Clone,
    {
        self.build_with_comparer(engine, DefaultComparer)
    }

    /// Builds a serializer caching results with a custom equality.
    ///
    /// # Errors
    /// Invalid options and schema errors of `T`.
    pub fn build_with_comparer<T, C>(self, engine: Arc<dyn FeatureEngine>, comparer: C) -> Result<Serializer<T>>
    where
        T: FeatureExample + Clone,
        C: ExampleComparer<T> + 'static,
    {
        let cache: ExampleCache<T, SerializedExample, C> =
            ExampleCache::new(comparer, self.options.cache_max_entries)?;
        self.finish(engine, Some(Box::new(cache)))
    }

    fn finish<T: FeatureExample>(
        self,
        engine: Arc<dyn FeatureEngine>,
        cache: Option<Box<dyn ResultCache<T>>>,
    ) -> Result<Serializer<T>> {
        self.options.validate()?;
        let compiled = compiled::<T>(self.options.output_kind(), &self.registry)?;
        Ok(Serializer {
            engine,
            options: self.options,
            registry: self.registry,
            compiled,
            cache,
        })
    }
}

/// Serializes examples of type `T` through one engine.
pub struct Serializer<T> {
    engine: Arc<dyn FeatureEngine>,
    options: SerializerOptions,
    registry: MarshallerRegistry,
    compiled: Arc<CompiledSerializer<T>>,
    cache: Option<Box<dyn ResultCache<T>>>,
}

impl<T> fmt::Debug for Serializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("compiled", &self.compiled)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: FeatureExample> Serializer<T> {
    /// Serializes one example with its own labels.
    ///
    /// Cached serializers return the stored result for an equal example.
    ///
    /// # Errors
    /// Label errors raised by the engine.
    pub fn serialize(&self, example: &T) -> Result<Arc<SerializedExample>> {
        let mut compute = |example: &T| {
            self.compiled
                .serialize(self.engine.as_ref(), &self.options, example, LabelTarget::None)
        };
        match &self.cache {
            Some(cache) => cache.get_or_compute(example, &mut compute),
            None => compute(example).map(Arc::new),
        }
    }

    /// Serializes one example with a call-level label. Never cached.
    ///
    /// # Errors
    /// [`crate::FeatwireError::Label`] when `target` does not fit the example.
    pub fn serialize_labeled(&self, example: &T, target: LabelTarget<'_>) -> Result<SerializedExample> {
        self.compiled
            .serialize(self.engine.as_ref(), &self.options, example, target)
    }

    /// Serializes a batch in parallel, preserving order.
    ///
    /// # Errors
    /// The first error encountered.
    pub fn serialize_batch(&self, examples: &[T]) -> Result<Vec<Arc<SerializedExample>>> {
        examples.par_iter().map(|example| self.serialize(example)).collect()
    }

    /// Serializes `example` with both outputs and checks that the text parses back to the
    /// native form.
    ///
    /// # Errors
    /// Label and parse errors.
    pub fn validate(&self, example: &T) -> Result<ValidationReport> {
        let both = compiled::<T>(OutputKind::NativeAndText, &self.registry)?;
        let serialized = both.serialize(self.engine.as_ref(), &self.options, example, LabelTarget::None)?;
        cross_validate(self.engine.as_ref(), &serialized)
    }

    /// The compiled serializer in use.
    pub fn compiled(&self) -> &CompiledSerializer<T> {
        &self.compiled
    }

    /// The options this serializer was built with.
    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// The engine collaborator.
    pub fn engine(&self) -> &dyn FeatureEngine {
        self.engine.as_ref()
    }

    /// Cache counters; `None` for uncached serializers.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}
