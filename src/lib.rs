//! # featwire
//!
//! Schema-driven feature serialization for online learning engines.
//!
//! ## Overview
//!
//! Learning engines in the Vowpal Wabbit family consume examples as a label followed by
//! hashed features grouped into namespaces. featwire derives the feature schema of a Rust
//! type once, generates a specialized serializer for it, and then turns every value of that
//! type into the engine's native example (and, optionally, an equivalent text line) without
//! any per-call reflection.
//!
//! ### Key Features
//!
//! *   **Declarative schemas:** `#[derive(FeatureExample)]` with `#[featwire(...)]` member
//!     annotations for namespaces, groups, ordering, enumerization and anchors.
//! *   **Generated serializers:** extraction, grouping and marshaller resolution run once per
//!     type and output kind; the result is cached for the life of the process.
//! *   **Dual output:** native examples and the text form are written by the same step, so
//!     the text always parses back to the native form. [`Serializer::validate`] checks it.
//! *   **Pluggable marshalling:** per-member overrides and per-type registries on top of the
//!     built-in marshallers for numbers, enums, dense vectors, dictionaries and bags.
//! *   **Multi-line examples:** a shared line plus one line per candidate action.
//! *   **Result caching:** optional LRU cache keyed by example equality.
//!
//! ## Architecture
//!
//! ```text
//! declare -> extract -> group -> resolve -> compile -> serialize (-> cache)
//! ```
//!
//! * [`schema`]: the declaration traits implemented by the derive macros.
//! * [`extract`]: flattens nested members into guarded feature descriptors.
//! * [`group`]: partitions descriptors into ordered namespaces.
//! * [`marshal`]: marshaller traits, registry, built-ins and resolution.
//! * [`compile`]: builds and caches the per-type serializer.
//! * [`context`]: per-call state writing both outputs.
//! * [`engine`]: the engine collaborator interface and [`ReferenceEngine`].
//! * [`cache`]: the example result cache.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use featwire::{Featwire, FeatureExample, ReferenceEngine, SimpleLabel};
//!
//! #[derive(FeatureExample)]
//! struct User {
//!     #[featwire(namespace = "u")]
//!     age: u32,
//!     #[featwire(namespace = "u")]
//!     country: String,
//! }
//!
//! #[derive(FeatureExample)]
//! struct Impression {
//!     #[featwire(label)]
//!     label: SimpleLabel,
//!     user: User,
//! }
//!
//! let serializer = Featwire::builder()
//!     .text(true)
//!     .build::<Impression>(Arc::new(ReferenceEngine::new()))
//!     .unwrap();
//!
//! let out = serializer
//!     .serialize(&Impression {
//!         label: SimpleLabel::new(1.0),
//!         user: User { age: 30, country: "NL".into() },
//!     })
//!     .unwrap();
//! assert_eq!(out.text(), Some("1 |u age:30 countryNL"));
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **No Unsafe:** the crate forbids `unsafe` code.
//! * **No Panics:** no `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** all failures correspond to a [`FeatwireError`]; schema problems
//!   surface as [`SchemaError`] when a serializer is built, never while serializing.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// Lets the derived code refer to `::featwire` from inside this crate's own doctests and tests.
extern crate self as featwire;

// --- PUBLIC API MODULES ---
pub mod api;
pub mod cache;
pub mod compile;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod inspector;
pub mod marshal;
pub mod schema;
pub mod settings;
pub mod text;
pub mod validate;

// --- PIPELINE STAGES ---
pub mod extract;
pub mod group;

// --- MACRO SUPPORT MODULES ---

/// Runtime utilities used by the derived code.
#[doc(hidden)]
pub mod rt;

// --- RE-EXPORTS ---

pub use api::{Featwire, FeatwireBuilder, Serializer};
pub use cache::{CacheStats, DefaultComparer, ExampleComparer};
pub use compile::{LabelTarget, OutputKind};
pub use context::{MarshalContext, SerializedExample};
pub use descriptor::{Feature, Namespace, StringProcessing};
pub use engine::{
    ContextualBanditLabel, FeatureEngine, Label, NativeExample, ReferenceEngine, SimpleLabel,
};
pub use error::{ConfigError, FeatwireError, Result, SchemaError};
pub use marshal::{FeatureMarshaller, MarshallerHandle, MarshallerRegistry};
pub use schema::{FeatureEnum, FeatureExample};
pub use settings::SerializerOptions;
pub use text::{FloatFormat, set_float_format};
pub use validate::ValidationReport;

// Re-export the derive macros so they are accessible as `featwire::FeatureExample`
pub use featwire_derive::{FeatureEnum, FeatureExample};
