//! Engine collaborator interface and the in-crate reference engine.
//!
//! The learning engine owns hashing, label parsing and the native example layout. featwire
//! only talks to it through [`FeatureEngine`] and [`ExampleBuilder`]. [`ReferenceEngine`] is
//! a complete implementation used by the validator and the test suite; it hashes with
//! xxHash64 and counts live native examples so their release can be observed.

use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::error::{FeatwireError, Result};

/// Label text of the shared line of a multi-line example.
pub const SHARED_LABEL: &str = "shared";

/// Hashing, label parsing and example allocation supplied by the learning engine.
pub trait FeatureEngine: Send + Sync {
    /// Hashes a namespace name (`{group}{name}`).
    fn hash_space(&self, name: &str) -> u64;

    /// Hashes a feature name inside a namespace.
    fn hash_feature(&self, name: &str, namespace_hash: u64) -> u64;

    /// Hash of the dense element at `index`.
    fn hash_index(&self, namespace_hash: u64, index: u64) -> u64 {
        namespace_hash.wrapping_add(index)
    }

    /// Parses label text.
    ///
    /// # Errors
    /// [`FeatwireError::Label`] for text the engine does not understand.
    fn parse_label(&self, text: &str) -> Result<ParsedLabel> {
        ParsedLabel::parse(text)
    }

    /// Allocates an empty native example.
    fn new_example(&self) -> NativeExample {
        NativeExample::default()
    }

    /// Parses one text line, independently of any serializer.
    ///
    /// # Errors
    /// Label and weight parse failures.
    fn parse_line(&self, line: &str) -> Result<NativeExample> {
        crate::text::parse_line(self, line)
    }
}

// --- LABELS ---

/// A value that can label an example.
pub trait Label: Send + Sync {
    /// The label in engine text syntax.
    fn to_text(&self) -> String;
}

/// Regression / binary label with an optional importance weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimpleLabel {
    /// Target value.
    pub label: f32,
    /// Importance weight.
    pub weight: Option<f32>,
}

impl SimpleLabel {
    /// A label with the default weight.
    pub fn new(label: f32) -> Self {
        Self {
            label,
            weight: None,
        }
    }

    /// A label with an importance weight.
    pub fn weighted(label: f32, weight: f32) -> Self {
        Self {
            label,
            weight: Some(weight),
        }
    }
}

impl Label for SimpleLabel {
    fn to_text(&self) -> String {
        match self.weight {
            Some(weight) => format!("{} {}", self.label, weight),
            None => format!("{}", self.label),
        }
    }
}

/// Contextual bandit label: chosen action, observed cost, logging probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextualBanditLabel {
    /// Chosen action.
    pub action: u32,
    /// Observed cost.
    pub cost: f32,
    /// Probability the action was chosen with.
    pub probability: f32,
}

impl Label for ContextualBanditLabel {
    fn to_text(&self) -> String {
        format!("{}:{}:{}", self.action, self.cost, self.probability)
    }
}

/// Raw label text, passed to the engine untouched.
impl Label for String {
    fn to_text(&self) -> String {
        self.clone()
    }
}

/// A label as understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ParsedLabel {
    /// `<label> [<weight>]`
    Simple {
        /// Target value.
        label: f32,
        /// Importance weight (1 when absent).
        weight: f32,
    },
    /// `<action>:<cost>:<probability>`
    ContextualBandit {
        /// Chosen action.
        action: u32,
        /// Observed cost.
        cost: f32,
        /// Logging probability.
        probability: f32,
    },
    /// The shared line of a multi-line example.
    Shared,
}

impl ParsedLabel {
    /// Parses the reference label syntax.
    ///
    /// # Errors
    /// [`FeatwireError::Label`] for empty or malformed text.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text == SHARED_LABEL {
            return Ok(Self::Shared);
        }

        if text.contains(':') {
            let parts: Vec<&str> = text.split(':').collect();
            let [action, cost, probability] = parts.as_slice() else {
                return Err(FeatwireError::Label(format!(
                    "expected `action:cost:probability`, got `{text}`"
                )));
            };
            return Ok(Self::ContextualBandit {
                action: parse_part(action, text)?,
                cost: parse_part(cost, text)?,
                probability: parse_part(probability, text)?,
            });
        }

        let mut tokens = text.split_whitespace();
        let label = tokens
            .next()
            .ok_or_else(|| FeatwireError::Label("empty label".to_string()))?;
        let label = parse_part(label, text)?;
        let weight = match tokens.next() {
            Some(raw) => parse_part(raw, text)?,
            None => 1.0,
        };
        if tokens.next().is_some() {
            return Err(FeatwireError::Label(format!("trailing tokens in label `{text}`")));
        }
        Ok(Self::Simple { label, weight })
    }
}

fn parse_part<T: std::str::FromStr>(raw: &str, text: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| FeatwireError::Label(format!("`{raw}` in label `{text}`: {e}")))
}

// --- NATIVE EXAMPLES ---

/// Keeps an engine-side resource alive; releasing it decrements the owner's counter.
#[derive(Debug)]
pub struct Lease(Arc<AtomicUsize>);

impl Lease {
    /// Takes one unit of `counter`.
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One hashed feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeFeature {
    /// Feature hash.
    pub hash: u64,
    /// Feature weight.
    pub weight: f32,
}

/// One namespace of a native example.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeNamespace {
    /// Namespace index (first character of `{group}{name}`).
    pub index: char,
    /// Namespace hash.
    pub hash: u64,
    /// Features in insertion order.
    pub features: Vec<NativeFeature>,
}

/// The engine-side form of one example line.
#[derive(Debug, Default)]
pub struct NativeExample {
    label: Option<ParsedLabel>,
    namespaces: Vec<NativeNamespace>,
    lease: Option<Lease>,
}

impl PartialEq for NativeExample {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && self.namespaces == other.namespaces
    }
}

impl NativeExample {
    /// An empty example holding `lease` until dropped.
    pub fn with_lease(lease: Lease) -> Self {
        Self {
            lease: Some(lease),
            ..Self::default()
        }
    }

    /// Whether an engine resource is attached to this example.
    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }

    /// Parsed label, if the line had one.
    pub fn label(&self) -> Option<&ParsedLabel> {
        self.label.as_ref()
    }

    /// Non-empty namespaces in emission order.
    pub fn namespaces(&self) -> &[NativeNamespace] {
        &self.namespaces
    }

    /// Looks up a namespace by hash.
    pub fn namespace(&self, hash: u64) -> Option<&NativeNamespace> {
        self.namespaces.iter().find(|ns| ns.hash == hash)
    }

    /// Total number of features.
    pub fn feature_count(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.features.len()).sum()
    }

    /// Whether the example holds no features.
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Human-readable differences against `other`; empty when both carry the same label and
    /// the same features per namespace, regardless of feature order.
    pub fn diff(&self, other: &Self) -> Vec<String> {
        let mut differences = Vec::new();

        if self.label != other.label {
            differences.push(format!("label: {:?} != {:?}", self.label, other.label));
        }
        if self.namespaces.len() != other.namespaces.len() {
            differences.push(format!(
                "namespace count: {} != {}",
                self.namespaces.len(),
                other.namespaces.len()
            ));
        }

        for (position, (left, right)) in self.namespaces.iter().zip(&other.namespaces).enumerate() {
            if left.index != right.index || left.hash != right.hash {
                differences.push(format!(
                    "namespace #{position}: ('{}', {:#x}) != ('{}', {:#x})",
                    left.index, left.hash, right.index, right.hash
                ));
                continue;
            }
            let (l, r) = (sorted_features(left), sorted_features(right));
            if l != r {
                differences.push(format!(
                    "namespace '{}' ({:#x}) features: {:?} != {:?}",
                    left.index, left.hash, l, r
                ));
            }
        }

        differences
    }
}

fn sorted_features(namespace: &NativeNamespace) -> Vec<(u64, f32)> {
    let mut features: Vec<(u64, f32)> = namespace
        .features
        .iter()
        .map(|f| (f.hash, f.weight))
        .collect();
    features.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
    features
}

/// Incrementally fills a [`NativeExample`].
///
/// Namespaces that close with no features are discarded.
#[derive(Debug)]
pub struct ExampleBuilder {
    example: NativeExample,
    open: bool,
}

impl ExampleBuilder {
    /// Starts from an engine-allocated example.
    pub fn new(example: NativeExample) -> Self {
        Self {
            example,
            open: false,
        }
    }

    /// Sets the label.
    pub fn set_label(&mut self, label: ParsedLabel) {
        self.example.label = Some(label);
    }

    /// Opens a namespace, closing the previous one.
    pub fn open_namespace(&mut self, index: char, hash: u64) {
        if self.open {
            self.close_namespace();
        }
        self.example.namespaces.push(NativeNamespace {
            index,
            hash,
            features: Vec::new(),
        });
        self.open = true;
    }

    /// Reserves room for `additional` features in the open namespace.
    pub fn preallocate(&mut self, additional: usize) {
        if let Some(namespace) = self.current() {
            namespace.features.reserve(additional);
        }
    }

    /// Appends a feature to the open namespace.
    pub fn add_feature(&mut self, hash: u64, weight: f32) {
        if let Some(namespace) = self.current() {
            namespace.features.push(NativeFeature { hash, weight });
        }
    }

    /// Closes the open namespace and returns its feature count.
    pub fn close_namespace(&mut self) -> usize {
        if !self.open {
            return 0;
        }
        self.open = false;
        let count = self
            .example
            .namespaces
            .last()
            .map_or(0, |namespace| namespace.features.len());
        if count == 0 {
            self.example.namespaces.pop();
        }
        count
    }

    /// Closes any open namespace and returns the example.
    pub fn finish(mut self) -> NativeExample {
        self.close_namespace();
        self.example
    }

    fn current(&mut self) -> Option<&mut NativeNamespace> {
        if self.open {
            self.example.namespaces.last_mut()
        } else {
            None
        }
    }
}

// --- REFERENCE ENGINE ---

/// xxHash64-based engine used for validation and tests.
///
/// The empty namespace hashes to the seed. All-digit feature names hash to
/// `namespace_hash + n`, the same slot as the dense element at offset `n`.
#[derive(Debug, Clone, Default)]
pub struct ReferenceEngine {
    seed: u64,
    live: Arc<AtomicUsize>,
}

impl ReferenceEngine {
    /// An engine with seed 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with a custom hash seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            live: Arc::default(),
        }
    }

    /// Native examples allocated by this engine (and its clones) not yet dropped.
    pub fn live_examples(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

fn hash_bytes(seed: u64, bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(bytes);
    hasher.finish()
}

impl FeatureEngine for ReferenceEngine {
    fn hash_space(&self, name: &str) -> u64 {
        if name.is_empty() {
            self.seed
        } else {
            hash_bytes(self.seed, name.as_bytes())
        }
    }

    fn hash_feature(&self, name: &str, namespace_hash: u64) -> u64 {
        if !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_digit())
            && let Ok(offset) = name.parse::<u64>()
        {
            return self.hash_index(namespace_hash, offset);
        }
        hash_bytes(namespace_hash, name.as_bytes())
    }

    fn new_example(&self) -> NativeExample {
        NativeExample::with_lease(Lease::new(Arc::clone(&self.live)))
    }
}
