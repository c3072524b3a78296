#![allow(missing_docs)]

use std::sync::Arc;

use featwire::{
    ConfigError, FeatureExample, Featwire, FeatwireError, FloatFormat, OutputKind,
    ReferenceEngine, SerializerOptions,
};
use pretty_assertions::assert_eq;

#[derive(FeatureExample)]
struct Reading {
    #[featwire(namespace = "r")]
    value: f32,
}

#[test]
fn test_defaults() {
    let options = SerializerOptions::default();
    assert!(!options.text);
    assert_eq!(options.cache_max_entries, None);
    assert!(!options.dictify);
    assert_eq!(options.precision_warnings, cfg!(debug_assertions));
    assert_eq!(options.float_format, None);
    assert_eq!(options.output_kind(), OutputKind::Native);
    assert!(options.validate().is_ok());
}

#[test]
fn test_json_round_trip() {
    let options: SerializerOptions = serde_json::from_str(
        r#"{ "text": true, "cache_max_entries": 64, "float_format": "scientific" }"#,
    )
    .expect("valid options");
    assert!(options.text);
    assert_eq!(options.cache_max_entries, Some(64));
    assert_eq!(options.float_format, Some(FloatFormat::Scientific));
    assert_eq!(options.output_kind(), OutputKind::NativeAndText);

    let json = serde_json::to_string(&options).expect("serializable");
    let back: SerializerOptions = serde_json::from_str(&json).expect("round trip");
    assert_eq!(back, options);
}

#[test]
fn test_invalid_cache_size() {
    let options: SerializerOptions =
        serde_json::from_str(r#"{ "cache_max_entries": 0 }"#).expect("valid json");
    assert_eq!(options.validate(), Err(ConfigError::InvalidCacheSize(0)));

    let built = Featwire::builder()
        .options(options)
        .build::<Reading>(Arc::new(ReferenceEngine::new()));
    assert!(matches!(
        built,
        Err(FeatwireError::Config(ConfigError::InvalidCacheSize(0)))
    ));
}

#[test]
fn test_options_drive_serializer() -> featwire::Result<()> {
    let options = SerializerOptions {
        text: true,
        float_format: Some(FloatFormat::Scientific),
        ..SerializerOptions::default()
    };
    let serializer = Featwire::builder()
        .options(options.clone())
        .build::<Reading>(Arc::new(ReferenceEngine::new()))?;
    assert_eq!(serializer.options(), &options);
    assert_eq!(serializer.compiled().kind(), OutputKind::NativeAndText);

    let out = serializer.serialize(&Reading { value: 0.5 })?;
    assert_eq!(out.text(), Some("|r value:5.00000000e-1"));
    assert!(serializer.validate(&Reading { value: 0.5 })?.is_clean());
    Ok(())
}
