#![allow(missing_docs)]

use std::sync::Arc;

use featwire::compile::{OutputKind, compiled};
use featwire::inspector::SchemaInspector;
use featwire::marshal::Resolution;
use featwire::{
    Feature, FeatureExample, FeatureMarshaller, Featwire, MarshalContext, MarshallerRegistry,
    Namespace, ReferenceEngine,
};
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, Copy)]
struct Geo {
    lat: f64,
    lon: f64,
}

struct GeoMarshaller;

impl FeatureMarshaller<Geo> for GeoMarshaller {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, feature: &Feature, value: &Geo) {
        ctx.add_weighted(&format!("{}_lat", feature.name()), value.lat);
        ctx.add_weighted(&format!("{}_lon", feature.name()), value.lon);
    }
}

fn marshal_rounded(ctx: &mut MarshalContext<'_>, _: &Namespace, feature: &Feature, value: &Geo) {
    ctx.add_indicator(&format!("{}{:.0}x{:.0}", feature.name(), value.lat, value.lon));
}

struct Upper;

impl FeatureMarshaller<String> for Upper {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, _: &Feature, value: &String) {
        ctx.add_indicator(&value.to_uppercase());
    }
}

#[derive(FeatureExample)]
struct Store {
    #[featwire(namespace = "loc")]
    home: Geo,
    #[featwire(namespace = "loc", with = marshal_rounded)]
    work: Geo,
    #[featwire(namespace = "name", strings = "escape")]
    name: String,
}

fn store() -> Store {
    Store {
        home: Geo { lat: 1.5, lon: -2.0 },
        work: Geo { lat: 52.4, lon: 4.9 },
        name: "corner".to_string(),
    }
}

#[test]
fn test_registry_resolves_custom_types() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .text(true)
        .marshaller::<Geo, _>(GeoMarshaller)
        .build::<Store>(Arc::new(ReferenceEngine::new()))?;

    let out = serializer.serialize(&store())?;
    assert_eq!(
        out.text(),
        Some("|loc home_lat:1.5 home_lon:-2 work52x5 |name corner")
    );
    assert!(serializer.validate(&store())?.is_clean());
    Ok(())
}

#[test]
fn test_registry_overrides_builtin_but_not_member_binding() -> featwire::Result<()> {
    let mut registry = MarshallerRegistry::new();
    registry
        .register::<Geo, _>(GeoMarshaller)
        .register::<String, _>(Upper);
    assert_eq!(registry.len(), 2);

    let report = SchemaInspector::inspect_with::<Store>(&registry)?;
    let resolutions: Vec<(&str, Resolution)> = report
        .namespaces
        .iter()
        .flat_map(|ns| ns.features.iter())
        .map(|f| (f.name.as_str(), f.resolution))
        .collect();
    assert_eq!(
        resolutions,
        vec![
            ("home", Resolution::Registered),
            ("work", Resolution::Override),
            ("name", Resolution::Registered),
        ]
    );

    let out = Featwire::builder()
        .text(true)
        .marshaller::<Geo, _>(GeoMarshaller)
        .marshaller::<String, _>(Upper)
        .build::<Store>(Arc::new(ReferenceEngine::new()))?
        .serialize(&store())?;
    assert_eq!(
        out.text(),
        Some("|loc home_lat:1.5 home_lon:-2 work52x5 |name CORNER")
    );
    Ok(())
}

#[test]
fn test_registries_compile_separately() -> featwire::Result<()> {
    let engine = Arc::new(ReferenceEngine::new());
    let plain = Featwire::builder()
        .text(true)
        .marshaller::<Geo, _>(GeoMarshaller)
        .build::<Store>(engine.clone())?;
    let upper = Featwire::builder()
        .text(true)
        .marshaller::<Geo, _>(GeoMarshaller)
        .marshaller::<String, _>(Upper)
        .build::<Store>(engine)?;

    let plain_text = plain.serialize(&store())?.text().map(str::to_owned);
    let upper_text = upper.serialize(&store())?.text().map(str::to_owned);
    assert_ne!(plain_text, upper_text);
    Ok(())
}

// --- COMPILED SERIALIZER SHARING ---

struct ScaledGeo {
    factor: f64,
}

impl FeatureMarshaller<Geo> for ScaledGeo {
    fn marshal(&self, ctx: &mut MarshalContext<'_>, _: &Namespace, feature: &Feature, value: &Geo) {
        ctx.add_weighted(feature.name(), value.lat * self.factor);
    }
}

fn geo_and_upper() -> MarshallerRegistry {
    let mut registry = MarshallerRegistry::new();
    registry
        .register::<Geo, _>(GeoMarshaller)
        .register::<String, _>(Upper);
    registry
}

#[test]
fn test_identical_registrations_share_one_serializer() -> featwire::Result<()> {
    let first = geo_and_upper();
    let second = geo_and_upper();
    assert!(first.is_shareable());
    assert!(MarshallerRegistry::new().is_shareable());

    let serializer = compiled::<Store>(OutputKind::Native, &first)?;
    assert!(Arc::ptr_eq(&serializer, &compiled::<Store>(OutputKind::Native, &second)?));

    let mut reversed = MarshallerRegistry::new();
    reversed
        .register::<String, _>(Upper)
        .register::<Geo, _>(GeoMarshaller);
    assert!(Arc::ptr_eq(&serializer, &compiled::<Store>(OutputKind::Native, &reversed)?));

    let mut geo_only = MarshallerRegistry::new();
    geo_only.register::<Geo, _>(GeoMarshaller);
    assert!(!Arc::ptr_eq(&serializer, &compiled::<Store>(OutputKind::Native, &geo_only)?));
    Ok(())
}

#[test]
fn test_stateful_registrations_stay_with_their_registry() -> featwire::Result<()> {
    let mut registry = MarshallerRegistry::new();
    registry.register::<Geo, _>(ScaledGeo { factor: 2.0 });
    assert!(!registry.is_shareable());

    let serializer = compiled::<Store>(OutputKind::Native, &registry)?;
    let clone = registry.clone();
    assert!(Arc::ptr_eq(&serializer, &compiled::<Store>(OutputKind::Native, &clone)?));

    let mut other = MarshallerRegistry::new();
    other.register::<Geo, _>(ScaledGeo { factor: 3.0 });
    assert!(!Arc::ptr_eq(&serializer, &compiled::<Store>(OutputKind::Native, &other)?));

    let released = Arc::downgrade(&serializer);
    drop(serializer);
    drop(registry);
    drop(clone);
    assert!(released.upgrade().is_none());
    Ok(())
}

#[test]
fn test_registering_after_clone_recompiles() -> featwire::Result<()> {
    let mut registry = MarshallerRegistry::new();
    registry.register::<Geo, _>(ScaledGeo { factor: 2.0 });
    let before = compiled::<Store>(OutputKind::NativeAndText, &registry)?;

    let mut extended = registry.clone();
    extended.register::<String, _>(Upper);
    let after = compiled::<Store>(OutputKind::NativeAndText, &extended)?;
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(Arc::ptr_eq(&before, &compiled::<Store>(OutputKind::NativeAndText, &registry)?));
    Ok(())
}

#[test]
fn test_stateful_marshaller_output() -> featwire::Result<()> {
    let out = Featwire::builder()
        .text(true)
        .marshaller::<Geo, _>(ScaledGeo { factor: 2.0 })
        .build::<Store>(Arc::new(ReferenceEngine::new()))?
        .serialize(&store())?;
    assert_eq!(out.text(), Some("|loc home:3 work52x5 |name corner"));
    Ok(())
}

#[test]
fn test_marshaller_handles() {
    let handle = featwire::MarshallerHandle::from_fn::<Geo>(marshal_rounded);
    assert!(handle.ptr_eq(&handle.clone()));
    assert!(handle.describe().contains("FnMarshaller"), "{}", handle.describe());
}
