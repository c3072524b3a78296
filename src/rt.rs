// src/rt.rs

//! Runtime utilities for generated code (Macros).
//! Do not use directly.

pub use crate::descriptor::StringProcessing;
pub use crate::marshal::MarshallerHandle;
pub use crate::schema::{Access, FeatureAttr, MemberKind, SchemaDeclaration};

/// Compile-time shape dispatch.
///
/// The derive expands every member into
/// `(&&&&&&&&Probe::<T>::new()).member_kind()` with all `Via*` traits in scope. Method
/// resolution strips one reference per step and stops at the first trait whose bounds `T`
/// satisfies, so the most specific shape wins:
///
/// | refs | trait | bound |
/// |---|---|---|
/// | 7 | [`ViaNested`] | [`FeatureExample`] |
/// | 6 | [`ViaEnum`] | [`FeatureEnum`] |
/// | 5 | [`ViaDense`] | [`DenseFeature`] |
/// | 4 | [`ViaNumeric`] | [`NumericFeature`] |
/// | 3 | [`ViaDictionary`] | [`DictionaryFeature`] |
/// | 2 | [`ViaBag`] | [`BagFeature`] |
/// | 1 | [`ViaDisplay`] | `Display` |
/// | 0 | [`ViaOpaque`] | none |
pub mod probe {
    use std::any::Any;
    use std::fmt::Display;
    use std::marker::PhantomData;

    use crate::descriptor::ValueShape;
    use crate::extract::extract;
    use crate::marshal::{
        BagFeature, BagMarshaller, DenseFeature, DenseMarshaller, DictionaryFeature,
        DictionaryMarshaller, DisplayMarshaller, EnumMarshaller, MarshallerHandle,
        NumericFeature, NumericMarshaller,
    };
    use crate::schema::{FeatureEnum, FeatureExample, LeafKind, MemberKind};

    /// Zero-sized probe for a member type.
    #[derive(Debug)]
    pub struct Probe<T: ?Sized>(PhantomData<fn() -> Box<T>>);

    impl<T: ?Sized> Probe<T> {
        /// Creates the probe.
        #[allow(clippy::new_without_default)]
        pub fn new() -> Self {
            Self(PhantomData)
        }
    }

    fn render_display<T: Display + 'static>(value: &dyn Any) -> Option<String> {
        value.downcast_ref::<T>().map(ToString::to_string)
    }

    fn render_variant<T: FeatureEnum>(value: &dyn Any) -> Option<String> {
        value
            .downcast_ref::<T>()
            .and_then(|v| T::variants().get(v.variant_index()))
            .map(|name| (*name).to_owned())
    }

    /// Types with their own feature members.
    pub trait ViaNested<T> {
        /// Classifies `T`.
        fn member_kind(&self) -> MemberKind<T>;
    }

    impl<T: FeatureExample> ViaNested<T> for &&&&&&&Probe<T> {
        fn member_kind(&self) -> MemberKind<T> {
            MemberKind::Nested(extract::<T>)
        }
    }

    /// Unit enums.
    pub trait ViaEnum<T> {
        /// Classifies `T`.
        fn member_kind(&self) -> MemberKind<T>;
    }

    impl<T: FeatureEnum> ViaEnum<T> for &&&&&&Probe<T> {
        fn member_kind(&self) -> MemberKind<T> {
            MemberKind::Leaf(
                LeafKind::new(ValueShape::Enum)
                    .with_marshaller(MarshallerHandle::new::<T, _>(EnumMarshaller))
                    .with_render(render_variant::<T>)
                    .with_variants(T::variants()),
            )
        }
    }

    /// Contiguous numeric sequences.
    pub trait ViaDense<T> {
        /// Classifies `T`.
        fn member_kind(&self) -> MemberKind<T>;
    }

    impl<T: DenseFeature> ViaDense<T> for &&&&&Probe<T> {
        fn member_kind(&self) -> MemberKind<T> {
            MemberKind::Leaf(
                LeafKind::new(ValueShape::Dense)
                    .with_marshaller(MarshallerHandle::new::<T, _>(DenseMarshaller)),
            )
        }
    }

    /// Numeric scalars and `bool`.
    pub trait ViaNumeric<T> {
        /// Classifies `T`.
        fn member_kind(&self) -> MemberKind<T>;
    }

    impl<T: NumericFeature> ViaNumeric<T> for &&&&Probe<T> {
        fn member_kind(&self) -> MemberKind<T> {
            MemberKind::Leaf(
                LeafKind::new(ValueShape::Numeric)
                    .with_marshaller(MarshallerHandle::new::<T, _>(NumericMarshaller))
                    .with_render(render_display::<T>),
            )
        }
    }

    /// Key to weight maps.
    pub trait ViaDictionary<T> {
        /// Classifies `T`.
        fn member_kind(&self) -> MemberKind<T>;
    }

    impl<T: DictionaryFeature> ViaDictionary<T> for &&&Probe<T> {
        fn member_kind(&self) -> MemberKind<T> {
            MemberKind::Leaf(
                LeafKind::new(ValueShape::Dictionary)
                    .with_marshaller(MarshallerHandle::new::<T, _>(DictionaryMarshaller)),
            )
        }
    }

    /// Collections of displayable items.
    pub trait ViaBag<T> {
        /// Classifies `T`.
        fn member_kind(&self) -> MemberKind<T>;
    }

    impl<T: BagFeature> ViaBag<T> for &&Probe<T> {
        fn member_kind(&self) -> MemberKind<T> {
            MemberKind::Leaf(
                LeafKind::new(ValueShape::Bag)
                    .with_marshaller(MarshallerHandle::new::<T, _>(BagMarshaller)),
            )
        }
    }

    /// Anything with a `Display` rendering.
    pub trait ViaDisplay<T> {
        /// Classifies `T`.
        fn member_kind(&self) -> MemberKind<T>;
    }

    impl<T: Display + Send + Sync + 'static> ViaDisplay<T> for &Probe<T> {
        fn member_kind(&self) -> MemberKind<T> {
            MemberKind::Leaf(
                LeafKind::new(ValueShape::Display)
                    .with_marshaller(MarshallerHandle::new::<T, _>(DisplayMarshaller))
                    .with_render(render_display::<T>),
            )
        }
    }

    /// Fallback: no built-in handling.
    pub trait ViaOpaque<T> {
        /// Classifies `T`.
        fn member_kind(&self) -> MemberKind<T>;
    }

    impl<T> ViaOpaque<T> for Probe<T> {
        fn member_kind(&self) -> MemberKind<T> {
            MemberKind::Leaf(LeafKind::new(ValueShape::Opaque))
        }
    }
}
