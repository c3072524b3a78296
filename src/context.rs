//! Per-call marshalling state.
//!
//! A [`MarshalContext`] is created for one serialization call and never shared. It owns the
//! native example under construction, the text line mirroring it, and the optional memo
//! table used by memoized ("dictified") features. Every feature write goes to both outputs
//! under the same conditions, so the text form always parses back to the native form.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::{Feature, Namespace};
use crate::engine::{ExampleBuilder, FeatureEngine, Label, NativeExample};
use crate::error::Result;
use crate::settings::SerializerOptions;
use crate::text::{FloatFormat, float_format};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MemoKey {
    address: usize,
    type_id: TypeId,
}

#[derive(Debug, Clone, Copy)]
struct OpenNamespace {
    hash: u64,
    mark: usize,
}

/// Scratch space for one serialization call.
pub struct MarshalContext<'e> {
    engine: &'e dyn FeatureEngine,
    text: bool,
    float_format: FloatFormat,
    precision_warnings: bool,
    dictify_all: bool,
    memo: HashMap<MemoKey, Arc<str>>,
    builder: Option<ExampleBuilder>,
    line: String,
    open: Option<OpenNamespace>,
    natives: Vec<NativeExample>,
    texts: Vec<String>,
    multi_line: bool,
}

impl fmt::Debug for MarshalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshalContext")
            .field("text", &self.text)
            .field("float_format", &self.float_format)
            .field("lines", &self.natives.len())
            .field("memo", &self.memo.len())
            .finish_non_exhaustive()
    }
}

impl<'e> MarshalContext<'e> {
    /// Creates a context writing through `engine`.
    pub fn new(engine: &'e dyn FeatureEngine, options: &SerializerOptions) -> Self {
        Self {
            engine,
            text: options.text,
            float_format: options.float_format.unwrap_or_else(float_format),
            precision_warnings: options.precision_warnings,
            dictify_all: options.dictify,
            memo: HashMap::new(),
            builder: None,
            line: String::new(),
            open: None,
            natives: Vec::new(),
            texts: Vec::new(),
            multi_line: false,
        }
    }

    pub(crate) fn set_text(&mut self, text: bool) {
        self.text = text;
    }

    /// The engine collaborator.
    pub fn engine(&self) -> &'e dyn FeatureEngine {
        self.engine
    }

    /// Whether the text form is being produced.
    pub fn text_enabled(&self) -> bool {
        self.text
    }

    /// Hash of the open namespace.
    pub fn namespace_hash(&self) -> Option<u64> {
        self.open.map(|open| open.hash)
    }

    /// Adds `name:weight` to the open namespace. Zero and NaN weights are skipped.
    pub fn add_weighted(&mut self, name: &str, weight: f64) {
        let Some(open) = self.open else {
            return;
        };
        let weight = self.narrow(name, weight);
        if weight == 0.0 || weight.is_nan() {
            return;
        }
        let hash = self.engine.hash_feature(name, open.hash);
        if let Some(builder) = &mut self.builder {
            builder.add_feature(hash, weight);
        }
        if self.text {
            self.line.push(' ');
            self.line.push_str(name);
            self.line.push(':');
            self.line.push_str(&self.float_format.format(weight));
        }
    }

    /// Adds the indicator `name` (weight 1) to the open namespace.
    pub fn add_indicator(&mut self, name: &str) {
        let Some(open) = self.open else {
            return;
        };
        let hash = self.engine.hash_feature(name, open.hash);
        if let Some(builder) = &mut self.builder {
            builder.add_feature(hash, 1.0);
        }
        if self.text {
            self.line.push(' ');
            self.line.push_str(name);
        }
    }

    /// Adds a dense vector addressed by offset.
    ///
    /// With `anchor`, a constant `0:1` goes first and the elements move to offsets `1..=n`.
    pub fn add_dense<I: IntoIterator<Item = f64>>(&mut self, anchor: bool, weights: I) {
        let Some(open) = self.open else {
            return;
        };
        let offset = usize::from(anchor);
        if anchor {
            self.add_index(open.hash, 0, 1.0);
        }
        for (position, weight) in weights.into_iter().enumerate() {
            let index = position + offset;
            let weight = self.narrow("dense", weight);
            if weight == 0.0 || weight.is_nan() {
                continue;
            }
            self.add_index(open.hash, index, weight);
        }
    }

    /// Reserves room for `additional` features in the open namespace.
    pub fn preallocate(&mut self, additional: usize) {
        if let Some(builder) = &mut self.builder {
            builder.preallocate(additional);
        }
    }

    /// Renders `value`, reusing an earlier rendering of the same value when memoization is on
    /// for `feature`.
    ///
    /// The memo is keyed by the value's address and type, not by value equality: two equal
    /// values at different addresses are rendered separately. Entries live as long as this
    /// context.
    pub fn rendered(
        &mut self,
        feature: &Feature,
        value: &dyn Any,
        render: impl FnOnce() -> String,
    ) -> Arc<str> {
        if !(self.dictify_all || feature.dictify()) {
            return Arc::from(render());
        }
        let key = MemoKey {
            address: std::ptr::from_ref(value).cast::<()>() as usize,
            type_id: Any::type_id(value),
        };
        Arc::clone(self.memo.entry(key).or_insert_with(|| Arc::from(render())))
    }

    fn add_index(&mut self, namespace_hash: u64, index: usize, weight: f32) {
        let hash = self.engine.hash_index(namespace_hash, index as u64);
        if let Some(builder) = &mut self.builder {
            builder.add_feature(hash, weight);
        }
        if self.text {
            self.line.push(' ');
            self.line.push_str(&index.to_string());
            self.line.push(':');
            self.line.push_str(&self.float_format.format(weight));
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn narrow(&self, name: &str, weight: f64) -> f32 {
        let narrowed = weight as f32;
        if self.precision_warnings && weight.is_finite() && narrowed.is_infinite() {
            tracing::warn!(feature = name, value = weight, "feature weight exceeds f32 range");
        }
        narrowed
    }

    // --- Line structure, driven by the compiled serializer ---

    pub(crate) fn start_line(&mut self) {
        if self.builder.is_some() {
            self.end_line();
        }
        self.builder = Some(ExampleBuilder::new(self.engine.new_example()));
        self.line.clear();
    }

    pub(crate) fn write_label(&mut self, label: &dyn Label) -> Result<()> {
        self.write_label_text(&label.to_text())
    }

    pub(crate) fn write_label_text(&mut self, text: &str) -> Result<()> {
        let parsed = self.engine.parse_label(text)?;
        if let Some(builder) = &mut self.builder {
            builder.set_label(parsed);
        }
        if self.text {
            self.line.push_str(text.trim());
        }
        Ok(())
    }

    pub(crate) fn begin_namespace(&mut self, namespace: &Namespace) {
        let hash = self.engine.hash_space(namespace.full_name());
        if let Some(builder) = &mut self.builder {
            builder.open_namespace(namespace.index(), hash);
        }
        let mark = self.line.len();
        if self.text {
            if !self.line.is_empty() {
                self.line.push(' ');
            }
            self.line.push_str(namespace.header());
        }
        self.open = Some(OpenNamespace { hash, mark });
    }

    pub(crate) fn end_namespace(&mut self) -> usize {
        let Some(open) = self.open.take() else {
            return 0;
        };
        let count = self
            .builder
            .as_mut()
            .map_or(0, ExampleBuilder::close_namespace);
        if count == 0 {
            self.line.truncate(open.mark);
        }
        count
    }

    pub(crate) fn end_line(&mut self) {
        self.end_namespace();
        if let Some(builder) = self.builder.take() {
            self.natives.push(builder.finish());
            if self.text {
                self.texts.push(std::mem::take(&mut self.line));
            }
        }
    }

    pub(crate) fn mark_multi_line(&mut self) {
        self.multi_line = true;
    }

    /// Closes the current line and returns everything written.
    pub fn finish(mut self) -> SerializedExample {
        self.end_line();
        SerializedExample {
            lines: self.natives,
            text: self.text.then(|| self.texts.join("\n")),
            multi_line: self.multi_line,
        }
    }
}

/// Output of one serialization call.
#[derive(Debug, PartialEq)]
pub struct SerializedExample {
    lines: Vec<NativeExample>,
    text: Option<String>,
    multi_line: bool,
}

impl SerializedExample {
    /// The first (for single-line examples, the only) native example.
    pub fn native(&self) -> Option<&NativeExample> {
        self.lines.first()
    }

    /// Every native example, shared line first.
    pub fn lines(&self) -> &[NativeExample] {
        &self.lines
    }

    /// Text form, lines joined with `\n`, when text output was requested.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Whether this is a shared line followed by candidate lines.
    pub fn is_multi_line(&self) -> bool {
        self.multi_line
    }

    /// The shared line of a multi-line example.
    pub fn shared(&self) -> Option<&NativeExample> {
        if self.multi_line {
            self.lines.first()
        } else {
            None
        }
    }

    /// Candidate lines of a multi-line example, in collection order.
    pub fn actions(&self) -> &[NativeExample] {
        if self.multi_line {
            self.lines.get(1..).unwrap_or_default()
        } else {
            &[]
        }
    }
}
