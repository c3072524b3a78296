//! Cross-validation of the two output forms.
//!
//! Re-parses the text form of a [`SerializedExample`] with the engine's own line parser and
//! compares every line against the native example produced alongside it.

use serde::Serialize;

use crate::context::SerializedExample;
use crate::engine::FeatureEngine;
use crate::error::{FeatwireError, Result};

/// Outcome of comparing the text and native forms of one example.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Lines compared.
    pub lines: usize,
    /// Differences, prefixed with the line they were found on.
    pub differences: Vec<String>,
}

impl ValidationReport {
    /// Whether both forms agree.
    pub fn is_clean(&self) -> bool {
        self.differences.is_empty()
    }
}

/// Parses the text of `serialized` through `engine` and diffs it against the native lines.
///
/// # Errors
/// * [`FeatwireError::Validation`] when no text form was produced.
/// * Parse errors from the engine.
pub fn cross_validate(
    engine: &dyn FeatureEngine,
    serialized: &SerializedExample,
) -> Result<ValidationReport> {
    let Some(text) = serialized.text() else {
        return Err(FeatwireError::Validation(
            "example was serialized without its text form".to_owned(),
        ));
    };

    let natives = serialized.lines();
    let texts: Vec<&str> = text.split('\n').collect();
    let mut report = ValidationReport {
        lines: natives.len(),
        differences: Vec::new(),
    };

    if texts.len() != natives.len() {
        report.differences.push(format!(
            "line count: {} text != {} native",
            texts.len(),
            natives.len()
        ));
    }

    for (line, (text, native)) in texts.iter().zip(natives).enumerate() {
        let parsed = engine.parse_line(text)?;
        report.differences.extend(
            parsed
                .diff(native)
                .into_iter()
                .map(|difference| format!("line {line}: {difference}")),
        );
    }

    if !report.is_clean() {
        tracing::warn!(
            differences = report.differences.len(),
            "text and native forms disagree"
        );
    }
    Ok(report)
}
