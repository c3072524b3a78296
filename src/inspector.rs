// src/inspector.rs

//! Tools for inspecting the generated layout of an example type.
//! Useful for debugging namespace grouping and marshaller resolution.
//!
//! ```rust
//! use featwire::{FeatureExample, inspector::SchemaInspector};
//!
//! #[derive(FeatureExample)]
//! struct Ad {
//!     #[featwire(namespace = "ad")]
//!     price: f64,
//! }
//!
//! let report = SchemaInspector::inspect::<Ad>().unwrap();
//! assert_eq!(report.namespaces.len(), 1);
//! assert_eq!(report.namespaces[0].features[0].name, "price");
//! println!("{report}");
//! ```

use std::fmt;

use serde::Serialize;

use crate::compile::{OutputKind, compiled};
use crate::descriptor::{FeatureDescriptor, Namespace, ValueShape};
use crate::error::Result;
use crate::marshal::{MarshallerHandle, MarshallerRegistry, Resolution};
use crate::schema::FeatureExample;

/// A structural report of one example type.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    /// Example type name.
    pub example: &'static str,
    /// Namespaces in emission order.
    pub namespaces: Vec<NamespaceInfo>,
    /// Member path of the label, if any.
    pub label: Option<&'static str>,
    /// The action-dependent collection, if any.
    pub action_dependent: Option<ActionInfo>,
}

/// The action-dependent member of a multi-line example.
#[derive(Debug, Clone, Serialize)]
pub struct ActionInfo {
    /// Member path of the collection.
    pub member: &'static str,
    /// Candidate type name.
    pub candidate: &'static str,
}

/// One generated namespace.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceInfo {
    /// Text header, e.g. `|aUser`.
    pub header: String,
    /// Group character and escaped name.
    pub full_name: String,
    /// Whether the namespace holds a single dense feature.
    pub dense: bool,
    /// Features in emission order.
    pub features: Vec<FeatureInfo>,
}

impl NamespaceInfo {
    pub(crate) fn new(namespace: &Namespace, dense: bool) -> Self {
        Self {
            header: namespace.header().to_owned(),
            full_name: namespace.full_name().to_owned(),
            dense,
            features: Vec::new(),
        }
    }
}

/// One feature and the marshaller bound to it.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureInfo {
    /// Feature name.
    pub name: String,
    /// Dotted member path from the example root.
    pub path: String,
    /// Declared value type.
    pub value_type: &'static str,
    /// Shape classification.
    pub shape: ValueShape,
    /// Sort key inside the namespace.
    pub order: i32,
    /// Whether some step of the member chain may be absent.
    pub nullable: bool,
    /// How the marshaller was found.
    pub resolution: Resolution,
    /// Marshaller type name.
    pub marshaller: &'static str,
}

impl FeatureInfo {
    pub(crate) fn new<R>(
        descriptor: &FeatureDescriptor<R>,
        resolution: Resolution,
        marshaller: &MarshallerHandle,
    ) -> Self {
        Self {
            name: descriptor.name().to_owned(),
            path: descriptor.path().to_owned(),
            value_type: descriptor.value_type().name(),
            shape: descriptor.shape(),
            order: descriptor.order(),
            nullable: descriptor.is_nullable_chain(),
            resolution,
            marshaller: marshaller.describe(),
        }
    }
}

/// The featwire schema inspector.
#[derive(Debug)]
pub struct SchemaInspector;

impl SchemaInspector {
    /// Reports the layout of `T` with built-in marshallers only.
    ///
    /// # Errors
    /// Schema errors of `T`.
    pub fn inspect<T: FeatureExample>() -> Result<SchemaReport> {
        Self::inspect_with::<T>(&MarshallerRegistry::new())
    }

    /// Reports the layout of `T` as resolved against `registry`.
    ///
    /// # Errors
    /// Schema errors of `T`.
    pub fn inspect_with<T: FeatureExample>(registry: &MarshallerRegistry) -> Result<SchemaReport> {
        let serializer = compiled::<T>(OutputKind::Native, registry)?;
        Ok(SchemaReport {
            example: serializer.example(),
            namespaces: serializer.layout().to_vec(),
            label: serializer.label_member(),
            action_dependent: serializer
                .action_member()
                .map(|(member, candidate)| ActionInfo { member, candidate }),
        })
    }
}

impl fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== FEATWIRE SCHEMA REPORT ===")?;
        writeln!(f, "Example:  {}", self.example)?;
        if let Some(label) = self.label {
            writeln!(f, "Label:    {label}")?;
        }
        if let Some(action) = &self.action_dependent {
            writeln!(f, "Actions:  {} ({})", action.member, action.candidate)?;
        }
        writeln!(f, "\n[NAMESPACES]")?;
        for (i, namespace) in self.namespaces.iter().enumerate() {
            namespace.fmt_tree(f, i + 1 == self.namespaces.len())?;
        }
        Ok(())
    }
}

impl NamespaceInfo {
    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, is_last: bool) -> fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let dense = if self.dense { " [dense]" } else { "" };
        writeln!(f, "{connector}{}{dense}", self.header)?;

        for (i, feature) in self.features.iter().enumerate() {
            let branch = if i + 1 == self.features.len() { "└── " } else { "├── " };
            let nullable = if feature.nullable { "?" } else { "" };
            writeln!(
                f,
                "{child_prefix}{branch}{} <- {}{nullable}: {} | {:?} via {}",
                feature.name, feature.path, feature.value_type, feature.resolution, feature.marshaller
            )?;
        }
        Ok(())
    }
}
