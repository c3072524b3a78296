//! # featwire Derive Macros
//!
//! This crate provides the procedural macros for `featwire`. It implements
//! `FeatureExample` (the per-type schema declaration) and `FeatureEnum` (categorical
//! variants).
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, LitBool, LitChar, LitInt, LitStr,
    PathArguments, Type, parse_macro_input,
};

/// Derives `featwire::FeatureExample`.
///
/// Field attributes (`#[featwire(...)]`):
/// * `name = "..."`, `namespace = "..."`, `group = 'c'` (not whitespace, `|` or `:`), `order = n`
/// * `enumerize`, `anchor`, `dictify`, `strings = "split" | "escape" | "escape_and_include_name"`
/// * `with = path::to::marshal_fn`
/// * `label`, `action_dependent`, `skip`
///
/// A bare `#[featwire]` marks a feature with default settings. Unannotated fields only
/// contribute the features of their own type, if it has any.
#[proc_macro_derive(FeatureExample, attributes(featwire))]
pub fn derive_feature_example(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_example(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derives `featwire::FeatureEnum` for a unit-only enum.
///
/// `#[featwire(name = "...")]` on a variant overrides its token.
#[proc_macro_derive(FeatureEnum, attributes(featwire))]
pub fn derive_feature_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_enum(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

// --- Internal Data Structures ---

#[derive(Default)]
struct FieldAttrs {
    annotated: bool,
    name: Option<LitStr>,
    namespace: Option<LitStr>,
    group: Option<LitChar>,
    order: Option<LitInt>,
    enumerize: bool,
    anchor: bool,
    dictify: bool,
    strings: Option<syn::Ident>,
    with: Option<syn::Path>,
    label: bool,
    action_dependent: bool,
    skip: bool,
}

/// How a field is reached from `&Self`.
struct FieldAccess {
    /// The member type handed to the schema (wrappers stripped).
    value_ty: Type,
    optional: bool,
    getter: proc_macro2::TokenStream,
}

fn parse_flag(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<bool> {
    if meta.input.peek(syn::Token![=]) {
        let lit: LitBool = meta.value()?.parse()?;
        Ok(lit.value)
    } else {
        Ok(true)
    }
}

/// Parses `#[featwire(...)]` attributes on a field.
fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("featwire") {
            continue;
        }
        parsed.annotated = true;
        // A bare `#[featwire]` has no nested meta.
        if matches!(attr.meta, syn::Meta::Path(_)) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                parsed.name = Some(meta.value()?.parse()?);
                return Ok(());
            }
            if meta.path.is_ident("namespace") {
                parsed.namespace = Some(meta.value()?.parse()?);
                return Ok(());
            }
            if meta.path.is_ident("group") {
                let lit: LitChar = meta.value()?.parse()?;
                let c = lit.value();
                if c.is_whitespace() || c == '|' || c == ':' {
                    return Err(syn::Error::new(
                        lit.span(),
                        "group cannot be whitespace, `|` or `:`",
                    ));
                }
                parsed.group = Some(lit);
                return Ok(());
            }
            if meta.path.is_ident("order") {
                let lit: LitInt = meta.value()?.parse()?;
                lit.base10_parse::<i32>()?;
                parsed.order = Some(lit);
                return Ok(());
            }
            if meta.path.is_ident("enumerize") {
                parsed.enumerize = parse_flag(&meta)?;
                return Ok(());
            }
            if meta.path.is_ident("anchor") {
                parsed.anchor = parse_flag(&meta)?;
                return Ok(());
            }
            if meta.path.is_ident("dictify") {
                parsed.dictify = parse_flag(&meta)?;
                return Ok(());
            }
            if meta.path.is_ident("strings") {
                let lit: LitStr = meta.value()?.parse()?;
                let variant = match lit.value().as_str() {
                    "split" => "Split",
                    "escape" => "Escape",
                    "escape_and_include_name" => "EscapeAndIncludeName",
                    _ => {
                        return Err(meta.error(
                            "Unknown string processing. Supported: split, escape, escape_and_include_name",
                        ));
                    }
                };
                parsed.strings = Some(syn::Ident::new(variant, lit.span()));
                return Ok(());
            }
            if meta.path.is_ident("with") {
                parsed.with = Some(meta.value()?.parse()?);
                return Ok(());
            }
            if meta.path.is_ident("label") {
                parsed.label = true;
                return Ok(());
            }
            if meta.path.is_ident("action_dependent") {
                parsed.action_dependent = true;
                return Ok(());
            }
            if meta.path.is_ident("skip") {
                parsed.skip = true;
                return Ok(());
            }
            Err(meta.error(
                "Unknown featwire attribute key. Supported: name, namespace, group, order, \
                 enumerize, anchor, dictify, strings, with, label, action_dependent, skip",
            ))
        })?;
    }

    let roles = [parsed.label, parsed.action_dependent, parsed.skip]
        .iter()
        .filter(|set| **set)
        .count();
    if roles > 1 {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "`label`, `action_dependent` and `skip` are mutually exclusive",
        ));
    }
    Ok(parsed)
}

/// Returns the single type argument of `Wrapper<T>` when the last path segment is `wrapper`.
fn wrapped<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// `Box<T>` with a sized `T`; boxed slices, `str` and trait objects stay boxed.
fn boxed(ty: &Type) -> Option<&Type> {
    let inner = wrapped(ty, "Box")?;
    match inner {
        Type::Path(path) if !path.path.is_ident("str") => Some(inner),
        _ => None,
    }
}

/// Strips `Option` and `Box` wrappers, picking the matching getter.
fn field_access(ident: &syn::Ident, ty: &Type) -> FieldAccess {
    if let Some(inner) = wrapped(ty, "Option") {
        if let Some(boxed) = boxed(inner) {
            return FieldAccess {
                value_ty: boxed.clone(),
                optional: true,
                getter: quote! { root.#ident.as_deref() },
            };
        }
        return FieldAccess {
            value_ty: inner.clone(),
            optional: true,
            getter: quote! { root.#ident.as_ref() },
        };
    }
    if let Some(boxed) = boxed(ty) {
        return FieldAccess {
            value_ty: boxed.clone(),
            optional: false,
            getter: quote! { ::core::option::Option::Some(&*root.#ident) },
        };
    }
    FieldAccess {
        value_ty: ty.clone(),
        optional: false,
        getter: quote! { ::core::option::Option::Some(&root.#ident) },
    }
}

fn option_tokens<T: quote::ToTokens>(value: Option<&T>) -> proc_macro2::TokenStream {
    match value {
        Some(value) => quote! { ::core::option::Option::Some(#value) },
        None => quote! { ::core::option::Option::None },
    }
}

// --- Generator: FeatureExample ---

fn expand_example(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(ds) => ds,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "FeatureExample only supports structs",
            ));
        }
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "FeatureExample does not support generic structs",
        ));
    }
    let fields = match &data_struct.fields {
        Fields::Named(named) => &named.named,
        Fields::Unit => {
            return Ok(generate_declare(name, &[]));
        }
        Fields::Unnamed(_) => {
            return Err(syn::Error::new(
                name.span(),
                "FeatureExample requires named fields",
            ));
        }
    };

    let mut declarations = Vec::new();
    for field in fields {
        let Some(ident) = &field.ident else {
            continue;
        };
        let attrs = parse_field_attributes(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        declarations.push(generate_member(ident, &field.ty, &attrs));
    }

    Ok(generate_declare(name, &declarations))
}

fn generate_declare(
    name: &syn::Ident,
    declarations: &[proc_macro2::TokenStream],
) -> proc_macro2::TokenStream {
    quote! {
        impl ::featwire::FeatureExample for #name {
            #[allow(unused_variables)]
            fn declare(schema: &mut ::featwire::rt::SchemaDeclaration<Self>) {
                #(#declarations)*
            }
        }
    }
}

fn generate_member(ident: &syn::Ident, ty: &Type, attrs: &FieldAttrs) -> proc_macro2::TokenStream {
    let path = ident.to_string();
    let FieldAccess {
        value_ty,
        optional,
        getter,
    } = field_access(ident, ty);

    let constructor = if optional {
        quote! { optional }
    } else {
        quote! { required }
    };
    let access = quote! {
        ::featwire::rt::Access::<Self, #value_ty>::#constructor(#path, |root: &Self| #getter)
    };

    if attrs.label {
        return quote! { schema.label(#access); };
    }
    if attrs.action_dependent {
        return quote! { schema.action_dependent(#access); };
    }

    let probe = quote! {
        {
            #[allow(unused_imports)]
            use ::featwire::rt::probe::*;
            (&&&&&&&&::featwire::rt::probe::Probe::<#value_ty>::new()).member_kind()
        }
    };

    if !attrs.annotated {
        return quote! { schema.nested(#access, #probe); };
    }

    let feature_name = attrs
        .name
        .as_ref()
        .map_or_else(|| path.clone(), LitStr::value);
    let namespace = option_tokens(attrs.namespace.as_ref());
    let group = option_tokens(attrs.group.as_ref());
    let order = option_tokens(attrs.order.as_ref());
    let enumerize = attrs.enumerize;
    let anchor = attrs.anchor;
    let dictify = attrs.dictify;
    let strings = match &attrs.strings {
        Some(variant) => quote! {
            ::core::option::Option::Some(::featwire::rt::StringProcessing::#variant)
        },
        None => quote! { ::core::option::Option::None },
    };
    let with = match &attrs.with {
        Some(func) => quote! {
            ::core::option::Option::Some(::featwire::rt::MarshallerHandle::from_fn::<#value_ty>(#func))
        },
        None => quote! { ::core::option::Option::None },
    };

    quote! {
        schema.feature(
            ::featwire::rt::FeatureAttr {
                name: #feature_name,
                namespace: #namespace,
                group: #group,
                order: #order,
                enumerize: #enumerize,
                add_anchor: #anchor,
                dictify: #dictify,
                strings: #strings,
            },
            #access,
            #probe,
            #with,
        );
    }
}

// --- Generator: FeatureEnum ---

fn parse_variant_name(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let mut name = None;
    for attr in attrs {
        if attr.path().is_ident("featwire") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    name = Some(meta.value()?.parse()?);
                    return Ok(());
                }
                Err(meta.error("Unknown featwire variant attribute. Supported: name"))
            })?;
        }
    }
    Ok(name)
}

fn expand_enum(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    let data_enum = match &input.data {
        Data::Enum(de) => de,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "FeatureEnum only supports enums",
            ));
        }
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "FeatureEnum does not support generic enums",
        ));
    }

    let mut names = Vec::new();
    let mut arms = Vec::new();
    for (index, variant) in data_enum.variants.iter().enumerate() {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "FeatureEnum variants must be unit variants",
            ));
        }
        let ident = &variant.ident;
        let token = parse_variant_name(&variant.attrs)?
            .map_or_else(|| ident.to_string(), |lit| lit.value());
        names.push(token);
        arms.push(quote! { Self::#ident => #index, });
    }

    let body = if arms.is_empty() {
        quote! { match *self {} }
    } else {
        quote! { match self { #(#arms)* } }
    };

    Ok(quote! {
        impl ::featwire::FeatureEnum for #name {
            fn variants() -> &'static [&'static str] {
                &[#(#names),*]
            }

            fn variant_index(&self) -> usize {
                #body
            }
        }
    })
}
