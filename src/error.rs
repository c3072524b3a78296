//! Centralized error handling for featwire.
//!
//! Failures fall into a small number of domains, and the split matters for callers:
//!
//! - **Schema errors** ([`SchemaError`]) come from the declared example types. They are
//!   raised while a serializer is being compiled, before any example is marshalled, and
//!   always name the example type and the member path involved.
//! - **Configuration errors** ([`ConfigError`]) come from builder and cache options.
//! - **Label / parse errors** come from the engine collaborator when label text or a
//!   text line cannot be understood.
//!
//! Missing data (a `None` along an optional chain, an absent dense vector) is not an
//! error: such features simply contribute nothing.
//!
//! ```rust
//! use featwire::{FeatwireError, SchemaError};
//!
//! fn describe(err: &FeatwireError) -> &'static str {
//!     match err {
//!         FeatwireError::Schema(SchemaError::MultipleDenseFeatures { .. }) => "dense clash",
//!         FeatwireError::Schema(_) => "schema",
//!         _ => "other",
//!     }
//! }
//! # let _ = describe;
//! ```

use thiserror::Error;

/// A specialized `Result` type for featwire operations.
pub type Result<T> = std::result::Result<T, FeatwireError>;

/// The master error enum covering all failure domains in featwire.
///
/// This type is `Clone` so compiled-serializer failures can be reported to every
/// thread that raced on the same first request.
#[derive(Debug, Clone, Error)]
pub enum FeatwireError {
    /// The declared example schema cannot be compiled.
    #[error("Schema Error: {0}")]
    Schema(#[from] SchemaError),

    /// Builder or cache options are invalid.
    #[error("Config Error: {0}")]
    Config(#[from] ConfigError),

    /// Label text was rejected by the engine, or a label was attached to the wrong line.
    #[error("Label Error: {0}")]
    Label(String),

    /// A text line could not be parsed by the reference parser.
    #[error("Parse Error: {0}")]
    Parse(String),

    /// Cross validation could not run.
    #[error("Validation Error: {0}")]
    Validation(String),

    /// Logic error inside the library. Should not occur; please report it.
    #[error("Internal Logic Error: {0}")]
    Internal(String),
}

/// Errors detected while turning a declared example type into a compiled serializer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No marshaller matches the value type of a feature.
    #[error(
        "unable to resolve marshal method for `{member}` (type `{value_type}`) in `{example}`"
    )]
    UnresolvedMarshaller {
        /// Example type being compiled.
        example: &'static str,
        /// Dotted member path from the example root.
        member: String,
        /// Rust type name of the feature value.
        value_type: &'static str,
    },

    /// A dense namespace received more than one feature.
    #[error("only one dense vector per namespace: `{namespace}` in `{example}` holds {members:?}")]
    MultipleDenseFeatures {
        /// Example type being compiled.
        example: &'static str,
        /// Rendered namespace (`{group}{name}`).
        namespace: String,
        /// Member paths mapped onto the namespace.
        members: Vec<String>,
    },

    /// The same namespace is used by both dense and sparse features.
    #[error("namespace `{namespace}` in `{example}` mixes dense and sparse features")]
    MixedNamespace {
        /// Example type being compiled.
        example: &'static str,
        /// Rendered namespace (`{group}{name}`).
        namespace: String,
    },

    /// More than one member is marked as the label.
    #[error("`{example}` declares more than one label member: {members:?}")]
    MultipleLabels {
        /// Example type being compiled.
        example: &'static str,
        /// Offending member paths.
        members: Vec<String>,
    },

    /// A type that must contribute at least one namespace declares no features.
    #[error("`{example}` declares no features")]
    NoFeatures {
        /// The featureless type.
        example: &'static str,
    },

    /// More than one action-dependent collection on a single example type.
    #[error("`{example}` declares more than one action-dependent member: {members:?}")]
    MultipleActionDependent {
        /// Example type being compiled.
        example: &'static str,
        /// Offending member paths.
        members: Vec<String>,
    },

    /// A type reaches itself through its own members.
    #[error("`{example}` contains itself through member `{member}`")]
    RecursiveSchema {
        /// The type that repeats on the extraction path.
        example: &'static str,
        /// Member through which it repeats.
        member: String,
    },

    /// An action-dependent candidate type declares its own action-dependent collection.
    #[error("candidate type `{candidate}` of `{example}` nests another action-dependent member")]
    NestedActionDependent {
        /// Example type being compiled.
        example: &'static str,
        /// Candidate type holding the nested collection.
        candidate: &'static str,
    },
}

/// Errors raised by invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The maximum cache size must be positive.
    #[error("cache size must be positive, got {0}")]
    InvalidCacheSize(usize),
}
