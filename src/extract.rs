//! FeatureDescriptor extraction.
//!
//! Walks the declaration table of an example type and flattens it into root-relative
//! [`FeatureDescriptor`]s. Nested feature types are expanded in place: their descriptors are
//! re-rooted onto the parent, the parent's `Option` guard is pushed in front of theirs, and
//! namespace/group metadata flows down unless a member overrides it. A nested type with no
//! features of its own is kept as a single leaf so a registered or member-level marshaller
//! can still handle it.
//!
//! The types currently being expanded are tracked per thread. A member whose type is
//! already on that path is reported as [`SchemaError::RecursiveSchema`].

use std::any::{TypeId, type_name};
use std::cell::RefCell;

use crate::descriptor::FeatureDescriptor;
use crate::error::{Result, SchemaError};
use crate::schema::{DeclaredMember, FeatureExample, SchemaDeclaration, Scope};

thread_local! {
    static EXPANDING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Marks a type as being expanded until dropped.
pub(crate) struct Expanding(());

impl Expanding {
    pub(crate) fn enter<R: 'static>() -> Self {
        EXPANDING.with(|path| path.borrow_mut().push(TypeId::of::<R>()));
        Self(())
    }
}

impl Drop for Expanding {
    fn drop(&mut self) {
        EXPANDING.with(|path| {
            path.borrow_mut().pop();
        });
    }
}

/// Fails when `T` is already being expanded further up the member chain.
pub(crate) fn ensure_not_expanding<T: 'static>(member: &str) -> std::result::Result<(), SchemaError> {
    let id = TypeId::of::<T>();
    if EXPANDING.with(|path| path.borrow().contains(&id)) {
        return Err(SchemaError::RecursiveSchema {
            example: type_name::<T>(),
            member: member.to_owned(),
        });
    }
    Ok(())
}

/// Extracts every feature of `R`, as seen from `scope`.
///
/// # Errors
/// [`SchemaError::RecursiveSchema`] when `R` reaches itself through its members.
pub fn extract<R: FeatureExample>(scope: &Scope) -> Result<Vec<FeatureDescriptor<R>>> {
    let _expanding = Expanding::enter::<R>();
    extract_members(SchemaDeclaration::<R>::collect().members, scope)
}

pub(crate) fn extract_members<R>(
    members: Vec<DeclaredMember<R>>,
    scope: &Scope,
) -> Result<Vec<FeatureDescriptor<R>>> {
    let mut features = Vec::with_capacity(members.len());

    for member in members {
        let inner = scope.enter(member.attr.as_ref());

        if let Some(nested) = &member.nested {
            let found = nested(&inner)?;
            if !found.is_empty() {
                tracing::trace!(
                    member = member.path,
                    count = found.len(),
                    "expanded nested features"
                );
                features.extend(found);
                continue;
            }
        }

        // Unannotated members carry no leaf and vanish here.
        if let Some(mut leaf) = member.leaf {
            leaf.namespace = inner.namespace;
            leaf.group = inner.group;
            features.push(leaf);
        }
    }

    Ok(features)
}
