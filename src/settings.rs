//! Serializable serializer options.
//!
//! Hosts usually load these from their own configuration files:
//!
//! ```rust
//! use featwire::SerializerOptions;
//!
//! let options: SerializerOptions = serde_json::from_str(r#"{ "text": true }"#).unwrap();
//! assert!(options.text);
//! assert_eq!(options.cache_max_entries, None);
//! ```

use serde::{Deserialize, Serialize};

use crate::compile::OutputKind;
use crate::error::ConfigError;
use crate::text::FloatFormat;

/// Options shared by every serializer built from one [`crate::FeatwireBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerOptions {
    /// Produce the text form alongside the native one.
    pub text: bool,
    /// Bound on cached results; `None` is unbounded.
    pub cache_max_entries: Option<usize>,
    /// Memoize renderings of `Display` and enumerized features.
    pub dictify: bool,
    /// Warn when a weight overflows `f32`.
    pub precision_warnings: bool,
    /// Float format for this serializer; `None` follows [`crate::text::float_format`].
    pub float_format: Option<FloatFormat>,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            text: false,
            cache_max_entries: None,
            dictify: false,
            precision_warnings: cfg!(debug_assertions),
            float_format: None,
        }
    }
}

impl SerializerOptions {
    /// The compiled-serializer flavor these options call for.
    pub fn output_kind(&self) -> OutputKind {
        if self.text {
            OutputKind::NativeAndText
        } else {
            OutputKind::Native
        }
    }

    /// Checks option values.
    ///
    /// # Errors
    /// [`ConfigError::InvalidCacheSize`] for a zero cache bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.cache_max_entries {
            Some(0) => Err(ConfigError::InvalidCacheSize(0)),
            _ => Ok(()),
        }
    }
}
