//! Serializer generation.
//!
//! [`CompiledSerializer::compile`] runs extraction, grouping and marshaller resolution once
//! and turns the result into a flat list of boxed closures: one per namespace, each calling
//! the guarded feature steps of its namespace in order. Nothing is looked up by name at
//! serialization time.
//!
//! Compiled serializers are kept for the life of the process, keyed by
//! `(type, output kind, registry contents)`, unless the registry holds a stateful marshaller
//! and keeps them itself. Concurrent first requests may compile in parallel; the first insert
//! wins and every caller receives the winner.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::context::{MarshalContext, SerializedExample};
use crate::descriptor::{Feature, FeatureDescriptor, Namespace};
use crate::engine::{FeatureEngine, Label, SHARED_LABEL};
use crate::error::{FeatwireError, Result, SchemaError};
use crate::extract::{Expanding, extract_members};
use crate::group::group_namespaces;
use crate::inspector::{FeatureInfo, NamespaceInfo};
use crate::marshal::{MarshallerHandle, MarshallerRegistry, resolve};
use crate::schema::{FeatureExample, LabelReader, SchemaDeclaration, Scope};
use crate::settings::SerializerOptions;

/// Which outputs a compiled serializer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    /// Native examples only.
    Native,
    /// Native examples and the equivalent text form.
    NativeAndText,
}

/// Call-level label selection.
#[derive(Clone, Copy, Default)]
pub enum LabelTarget<'l> {
    /// Use the labels declared on the examples themselves.
    #[default]
    None,
    /// Label a single-line example.
    Example(&'l dyn Label),
    /// Label one candidate of a multi-line example.
    Action {
        /// Candidate position in the action-dependent collection.
        index: usize,
        /// The label.
        label: &'l dyn Label,
    },
}

impl fmt::Debug for LabelTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Example(label) => f.debug_tuple("Example").field(&label.to_text()).finish(),
            Self::Action { index, label } => f
                .debug_struct("Action")
                .field("index", index)
                .field("label", &label.to_text())
                .finish(),
        }
    }
}

type Step<T> = Box<dyn Fn(&mut MarshalContext<'_>, &T) + Send + Sync>;

/// Emits the candidate lines of a multi-line example.
pub(crate) trait CandidateLines<R>: Send + Sync {
    fn count(&self, root: &R) -> usize;

    fn emit(&self, ctx: &mut MarshalContext<'_>, root: &R, target: LabelTarget<'_>) -> Result<()>;
}

struct Candidates<R, C> {
    get: for<'a> fn(&'a R) -> Option<&'a Vec<C>>,
    serializer: Arc<CompiledSerializer<C>>,
}

impl<R: 'static, C: FeatureExample> CandidateLines<R> for Candidates<R, C> {
    fn count(&self, root: &R) -> usize {
        (self.get)(root).map_or(0, Vec::len)
    }

    fn emit(&self, ctx: &mut MarshalContext<'_>, root: &R, target: LabelTarget<'_>) -> Result<()> {
        let Some(candidates) = (self.get)(root) else {
            return Ok(());
        };
        for (index, candidate) in candidates.iter().enumerate() {
            let label = match target {
                LabelTarget::Action { index: wanted, label } if wanted == index => Some(label),
                _ => None,
            };
            self.serializer.emit_line(ctx, candidate, label)?;
        }
        Ok(())
    }
}

pub(crate) fn bind_candidates<R: FeatureExample, C: FeatureExample>(
    get: for<'a> fn(&'a R) -> Option<&'a Vec<C>>,
    kind: OutputKind,
    registry: &MarshallerRegistry,
) -> Result<Box<dyn CandidateLines<R>>> {
    // Checked before compiling `C`, which would otherwise recurse on self-referencing types.
    if !SchemaDeclaration::<C>::collect().actions.is_empty() {
        return Err(SchemaError::NestedActionDependent {
            example: type_name::<R>(),
            candidate: type_name::<C>(),
        }
        .into());
    }
    let serializer = compiled::<C>(kind, registry)?;
    if serializer.namespaces.is_empty() {
        return Err(SchemaError::NoFeatures {
            example: type_name::<C>(),
        }
        .into());
    }
    Ok(Box::new(Candidates { get, serializer }))
}

struct ActionPlan<T> {
    path: &'static str,
    candidate: &'static str,
    lines: Box<dyn CandidateLines<T>>,
}

/// The generated serializer of one example type.
pub struct CompiledSerializer<T> {
    example: &'static str,
    kind: OutputKind,
    layout: Vec<NamespaceInfo>,
    namespaces: Vec<Step<T>>,
    label: Option<(&'static str, LabelReader<T>)>,
    actions: Option<ActionPlan<T>>,
}

impl<T> fmt::Debug for CompiledSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSerializer")
            .field("example", &self.example)
            .field("kind", &self.kind)
            .field("layout", &self.layout)
            .field("label", &self.label.as_ref().map(|(path, _)| path))
            .field("actions", &self.actions.as_ref().map(|plan| plan.path))
            .finish_non_exhaustive()
    }
}

fn feature_step<T: 'static>(
    namespace: Arc<Namespace>,
    descriptor: FeatureDescriptor<T>,
    marshaller: MarshallerHandle,
) -> Step<T> {
    let feature = Feature::from_descriptor(&descriptor);
    Box::new(move |ctx: &mut MarshalContext<'_>, example: &T| {
        if let Some(value) = descriptor.value(example) {
            marshaller.marshal(ctx, &namespace, &feature, value);
        }
    })
}

fn namespace_step<T: 'static>(
    namespace: Arc<Namespace>,
    preallocate: usize,
    features: Vec<Step<T>>,
) -> Step<T> {
    Box::new(move |ctx: &mut MarshalContext<'_>, example: &T| {
        ctx.begin_namespace(&namespace);
        if preallocate > 0 {
            ctx.preallocate(preallocate);
        }
        for feature in &features {
            feature(ctx, example);
        }
        ctx.end_namespace();
    })
}

impl<T: FeatureExample> CompiledSerializer<T> {
    /// Builds the serializer for `T`.
    ///
    /// Candidate types of an action-dependent member are compiled (or fetched) through
    /// [`compiled`].
    ///
    /// # Errors
    /// Any [`SchemaError`] found in `T` or its candidate type.
    pub fn compile(kind: OutputKind, registry: &MarshallerRegistry) -> Result<Self> {
        let example = type_name::<T>();
        let SchemaDeclaration {
            members,
            mut labels,
            mut actions,
        } = SchemaDeclaration::<T>::collect();

        let descriptors = {
            let _expanding = Expanding::enter::<T>();
            extract_members(members, &Scope::root())?
        };
        let groups = group_namespaces(example, descriptors)?;

        let mut namespaces = Vec::with_capacity(groups.len());
        let mut layout = Vec::with_capacity(groups.len());
        for group in groups {
            let namespace = Arc::new(group.to_namespace());
            let mut info = NamespaceInfo::new(&namespace, group.dense);
            let mut steps = Vec::with_capacity(group.features.len());

            for descriptor in group.features {
                let (marshaller, resolution) = resolve(example, &descriptor, registry)?;
                info.features.push(FeatureInfo::new(&descriptor, resolution, &marshaller));
                steps.push(feature_step(Arc::clone(&namespace), descriptor, marshaller));
            }

            let preallocate = if group.dense { 0 } else { steps.len() };
            namespaces.push(namespace_step(namespace, preallocate, steps));
            layout.push(info);
        }

        if labels.len() > 1 {
            return Err(SchemaError::MultipleLabels {
                example,
                members: labels.iter().map(|l| l.path.to_owned()).collect(),
            }
            .into());
        }
        let label = labels.pop().map(|member| (member.path, member.read));

        if actions.len() > 1 {
            return Err(SchemaError::MultipleActionDependent {
                example,
                members: actions.iter().map(|a| a.path.to_owned()).collect(),
            }
            .into());
        }
        let actions = match actions.pop() {
            Some(member) => Some(ActionPlan {
                path: member.path,
                candidate: member.candidate,
                lines: (member.bind)(kind, registry)?,
            }),
            None => None,
        };

        tracing::debug!(
            example,
            ?kind,
            namespaces = namespaces.len(),
            multi_line = actions.is_some(),
            "compiled serializer"
        );

        Ok(Self {
            example,
            kind,
            layout,
            namespaces,
            label,
            actions,
        })
    }
}

impl<T: 'static> CompiledSerializer<T> {
    /// Example type name.
    pub fn example(&self) -> &'static str {
        self.example
    }

    /// Output flavor.
    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Namespaces in emission order, with their features and marshallers.
    pub fn layout(&self) -> &[NamespaceInfo] {
        &self.layout
    }

    /// Member path of the label, if declared.
    pub fn label_member(&self) -> Option<&'static str> {
        self.label.as_ref().map(|(path, _)| *path)
    }

    /// `(member path, candidate type)` of the action-dependent collection, if declared.
    pub fn action_member(&self) -> Option<(&'static str, &'static str)> {
        self.actions.as_ref().map(|plan| (plan.path, plan.candidate))
    }

    /// Whether examples produce a shared line plus candidate lines.
    pub fn is_multi_line(&self) -> bool {
        self.actions.is_some()
    }

    /// Serializes one example into a fresh context.
    ///
    /// # Errors
    /// Label errors (see [`CompiledSerializer::serialize_into`]).
    pub fn serialize(
        &self,
        engine: &dyn FeatureEngine,
        options: &SerializerOptions,
        example: &T,
        target: LabelTarget<'_>,
    ) -> Result<SerializedExample> {
        let mut ctx = MarshalContext::new(engine, options);
        ctx.set_text(self.kind == OutputKind::NativeAndText);
        self.serialize_into(&mut ctx, example, target)?;
        Ok(ctx.finish())
    }

    /// Serializes one example into `ctx`.
    ///
    /// Single-line examples take their own label unless `target` supplies one. Multi-line
    /// examples emit the shared line first, then one line per candidate in collection order.
    ///
    /// # Errors
    /// * [`FeatwireError::Label`] when `target` does not fit the example shape or the engine
    ///   rejects label text.
    pub fn serialize_into(
        &self,
        ctx: &mut MarshalContext<'_>,
        example: &T,
        target: LabelTarget<'_>,
    ) -> Result<()> {
        let Some(plan) = &self.actions else {
            return match target {
                LabelTarget::None => self.emit_line(ctx, example, None),
                LabelTarget::Example(label) => self.emit_line(ctx, example, Some(label)),
                LabelTarget::Action { .. } => Err(FeatwireError::Label(format!(
                    "`{}` has no action-dependent member to label",
                    self.example
                ))),
            };
        };

        match target {
            LabelTarget::Example(_) => {
                return Err(FeatwireError::Label(format!(
                    "`{}` is multi-line; label a candidate by index instead",
                    self.example
                )));
            }
            LabelTarget::Action { index, .. } => {
                let count = plan.lines.count(example);
                if index >= count {
                    return Err(FeatwireError::Label(format!(
                        "label index {index} out of range for {count} candidates in `{}`",
                        self.example
                    )));
                }
            }
            LabelTarget::None => {}
        }

        ctx.mark_multi_line();
        ctx.start_line();
        ctx.write_label_text(SHARED_LABEL)?;
        self.emit_namespaces(ctx, example);
        ctx.end_line();

        plan.lines.emit(ctx, example, target)
    }

    pub(crate) fn emit_line(
        &self,
        ctx: &mut MarshalContext<'_>,
        example: &T,
        label: Option<&dyn Label>,
    ) -> Result<()> {
        ctx.start_line();
        let own = self.label.as_ref().and_then(|(_, read)| read(example));
        if let Some(label) = label.or(own) {
            ctx.write_label(label)?;
        }
        self.emit_namespaces(ctx, example);
        ctx.end_line();
        Ok(())
    }

    fn emit_namespaces(&self, ctx: &mut MarshalContext<'_>, example: &T) {
        for namespace in &self.namespaces {
            namespace(ctx, example);
        }
    }
}

// --- PROCESS-WIDE CACHE ---

type SharedKey = (TypeId, OutputKind, Vec<(TypeId, TypeId)>);

static COMPILED: LazyLock<RwLock<HashMap<SharedKey, Arc<dyn Any + Send + Sync>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Returns the compiled serializer of `T`, compiling it on first use.
///
/// Serializers built against a registry of stateless marshallers live for the rest of the
/// process, keyed by `(type, output kind, registry contents)`. Registries holding a stateful
/// marshaller keep their serializers themselves (see [`MarshallerRegistry`]).
///
/// # Errors
/// Schema errors from [`CompiledSerializer::compile`]. Failed compilations are not cached.
pub fn compiled<T: FeatureExample>(
    kind: OutputKind,
    registry: &MarshallerRegistry,
) -> Result<Arc<CompiledSerializer<T>>> {
    match registry.content_key() {
        Some(content) => get_or_compile(&COMPILED, (TypeId::of::<T>(), kind, content), kind, registry),
        None => get_or_compile(registry.owned_store(), (TypeId::of::<T>(), kind), kind, registry),
    }
}

fn get_or_compile<K, T>(
    store: &RwLock<HashMap<K, Arc<dyn Any + Send + Sync>>>,
    key: K,
    kind: OutputKind,
    registry: &MarshallerRegistry,
) -> Result<Arc<CompiledSerializer<T>>>
where
    K: Hash + Eq,
    T: FeatureExample,
{
    let existing = store.read().get(&key).cloned();
    if let Some(existing) = existing {
        return downcast(existing);
    }

    // Compiled outside the lock: candidate types re-enter this function.
    let fresh: Arc<dyn Any + Send + Sync> = Arc::new(CompiledSerializer::<T>::compile(kind, registry)?);
    let winner = Arc::clone(store.write().entry(key).or_insert(fresh));
    downcast(winner)
}

fn downcast<T: FeatureExample>(
    erased: Arc<dyn Any + Send + Sync>,
) -> Result<Arc<CompiledSerializer<T>>> {
    erased.downcast::<CompiledSerializer<T>>().map_err(|_| {
        FeatwireError::Internal(format!(
            "compiled cache entry for `{}` holds another type",
            type_name::<T>()
        ))
    })
}
