//! Namespace grouping.
//!
//! Descriptors sharing `(namespace, group, dense)` end up in one [`NamespaceGroup`]. Groups
//! keep the order in which they were first seen; features inside a group are stably sorted
//! by their declared `order`.

use std::collections::HashMap;

use crate::descriptor::{FeatureDescriptor, Namespace};
use crate::error::SchemaError;

type GroupKey = (Option<&'static str>, Option<char>, bool);

/// Features that share one engine namespace.
#[derive(Debug)]
pub struct NamespaceGroup<R> {
    /// Namespace name.
    pub namespace: Option<&'static str>,
    /// Feature group tag.
    pub group: Option<char>,
    /// Whether this group holds a dense vector.
    pub dense: bool,
    /// Members, in emission order.
    pub features: Vec<FeatureDescriptor<R>>,
}

impl<R> NamespaceGroup<R> {
    /// Runtime namespace for this group.
    pub fn to_namespace(&self) -> Namespace {
        Namespace::new(self.namespace, self.group)
    }
}

/// Groups descriptors into namespaces.
///
/// # Errors
/// * [`SchemaError::MultipleDenseFeatures`] when a dense namespace receives two features.
/// * [`SchemaError::MixedNamespace`] when a namespace mixes dense and sparse features.
pub fn group_namespaces<R>(
    example: &'static str,
    descriptors: Vec<FeatureDescriptor<R>>,
) -> Result<Vec<NamespaceGroup<R>>, SchemaError> {
    let mut groups: Vec<NamespaceGroup<R>> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for descriptor in descriptors {
        let key = (
            descriptor.namespace,
            descriptor.group,
            descriptor.shape().is_dense(),
        );
        match index.get(&key) {
            Some(&slot) => {
                if let Some(group) = groups.get_mut(slot) {
                    group.features.push(descriptor);
                }
            }
            None => {
                index.insert(key, groups.len());
                groups.push(NamespaceGroup {
                    namespace: key.0,
                    group: key.1,
                    dense: key.2,
                    features: vec![descriptor],
                });
            }
        }
    }

    for group in &groups {
        if group.dense && index.contains_key(&(group.namespace, group.group, false)) {
            return Err(SchemaError::MixedNamespace {
                example,
                namespace: group.to_namespace().full_name().to_owned(),
            });
        }
        if group.dense && group.features.len() > 1 {
            return Err(SchemaError::MultipleDenseFeatures {
                example,
                namespace: group.to_namespace().full_name().to_owned(),
                members: group.features.iter().map(|f| f.path().to_owned()).collect(),
            });
        }
    }

    for group in &mut groups {
        group.features.sort_by_key(|feature| feature.order());
    }

    Ok(groups)
}
