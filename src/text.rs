//! Text rendering policy and the reference line parser.
//!
//! The text form of an example is one line per native example:
//!
//! ```text
//! [<label>] |<group><namespace> <name> <name>:<weight> ... |<group2><namespace2> ...
//! ```
//!
//! [`parse_line`] reads that form back through a [`FeatureEngine`] so the result can be
//! compared with the native buffer produced in the same call.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::engine::{ExampleBuilder, FeatureEngine, NativeExample};
use crate::error::{FeatwireError, Result};

/// Float rendering in text output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatFormat {
    /// Shortest decimal that round-trips (`0.5`, `1`, `0.0000001`).
    #[default]
    Compact,
    /// Nine significant digits in scientific notation (`5.00000000e-1`).
    Scientific,
}

impl FloatFormat {
    /// Renders a weight.
    pub fn format(self, value: f32) -> String {
        match self {
            Self::Compact => format!("{value}"),
            Self::Scientific => format!("{value:.8e}"),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Compact => 0,
            Self::Scientific => 1,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Scientific,
            _ => Self::Compact,
        }
    }
}

static FLOAT_FORMAT: AtomicU8 = AtomicU8::new(0);

/// Sets the process-wide float format used when options do not pick one.
pub fn set_float_format(format: FloatFormat) {
    FLOAT_FORMAT.store(format.to_u8(), Ordering::Relaxed);
}

/// The process-wide float format.
pub fn float_format() -> FloatFormat {
    FloatFormat::from_u8(FLOAT_FORMAT.load(Ordering::Relaxed))
}

/// Replaces characters that would break the line syntax (whitespace, `|`, `:`) with `_`.
pub fn escape(raw: &str) -> Cow<'_, str> {
    if raw.chars().any(needs_escape) {
        Cow::Owned(
            raw.chars()
                .map(escape_char)
                .collect(),
        )
    } else {
        Cow::Borrowed(raw)
    }
}

/// [`escape`] for a single character, such as a feature group tag.
pub fn escape_char(c: char) -> char {
    if needs_escape(c) { '_' } else { c }
}

fn needs_escape(c: char) -> bool {
    c.is_whitespace() || c == '|' || c == ':'
}

/// Parses one text line into a native example.
///
/// Zero-valued features are dropped and namespaces left empty are discarded, as the native
/// builder does.
///
/// # Errors
/// * Label errors from [`FeatureEngine::parse_label`].
/// * [`FeatwireError::Parse`] for a weight that is not a number.
pub fn parse_line<E: FeatureEngine + ?Sized>(engine: &E, line: &str) -> Result<NativeExample> {
    let mut segments = line.split('|');
    let head = segments.next().unwrap_or_default().trim();

    let mut builder = ExampleBuilder::new(engine.new_example());
    if !head.is_empty() {
        builder.set_label(engine.parse_label(head)?);
    }

    for segment in segments {
        let (name, body) = match segment.find(char::is_whitespace) {
            Some(split) => segment.split_at(split),
            None => (segment, ""),
        };
        let hash = engine.hash_space(name);
        builder.open_namespace(name.chars().next().unwrap_or(' '), hash);

        for token in body.split_whitespace() {
            let (feature, weight) = match token.rsplit_once(':') {
                Some((feature, raw)) => {
                    let weight = raw.parse::<f32>().map_err(|e| {
                        FeatwireError::Parse(format!("bad weight in `{token}`: {e}"))
                    })?;
                    (feature, weight)
                }
                None => (token, 1.0),
            };
            if weight == 0.0 || weight.is_nan() {
                continue;
            }
            builder.add_feature(engine.hash_feature(feature, hash), weight);
        }

        builder.close_namespace();
    }

    Ok(builder.finish())
}

/// Parses a multi-line rendering, one native example per line.
///
/// # Errors
/// The first error of [`parse_line`].
pub fn parse_lines<E: FeatureEngine + ?Sized>(engine: &E, text: &str) -> Result<Vec<NativeExample>> {
    text.split('\n').map(|line| parse_line(engine, line)).collect()
}

