#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use featwire::cache::ExampleCache;
use featwire::{
    CacheStats, ConfigError, DefaultComparer, ExampleComparer, FeatureExample, Featwire,
    FeatwireError, ReferenceEngine,
};
use pretty_assertions::assert_eq;
use rayon::prelude::*;

#[derive(FeatureExample, Debug, Clone, PartialEq, Eq, Hash)]
struct Query {
    #[featwire(namespace = "q", strings = "split")]
    text: String,
    #[featwire(namespace = "q")]
    page: u32,
}

fn query(text: &str, page: u32) -> Query {
    Query {
        text: text.to_string(),
        page,
    }
}

#[test]
fn test_hit_returns_same_result() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .text(true)
        .build_cached::<Query>(Arc::new(ReferenceEngine::new()))?;

    let first = serializer.serialize(&query("red shoes", 1))?;
    let second = serializer.serialize(&query("red shoes", 1))?;
    let other = serializer.serialize(&query("red shoes", 2))?;

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(
        serializer.cache_stats(),
        Some(CacheStats {
            hits: 1,
            misses: 2,
            entries: 2,
        })
    );
    Ok(())
}

struct ByText;

impl ExampleComparer<Query> for ByText {
    fn equals(&self, left: &Query, right: &Query) -> bool {
        left.text == right.text
    }

    fn hash_of(&self, example: &Query) -> u64 {
        <DefaultComparer as ExampleComparer<String>>::hash_of(&DefaultComparer, &example.text)
    }
}

#[test]
fn test_custom_comparer() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .text(true)
        .build_with_comparer::<Query, _>(Arc::new(ReferenceEngine::new()), ByText)?;

    let first = serializer.serialize(&query("shoes", 1))?;
    let second = serializer.serialize(&query("shoes", 9))?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.text(), Some("|q shoes page:1"));
    Ok(())
}

#[test]
fn test_lru_eviction() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .cache_max_entries(2)
        .build_cached::<Query>(Arc::new(ReferenceEngine::new()))?;

    let a = serializer.serialize(&query("a", 1))?;
    serializer.serialize(&query("b", 1))?;
    // Touch `a` so `b` is the least recently used.
    let a_again = serializer.serialize(&query("a", 1))?;
    assert!(Arc::ptr_eq(&a, &a_again));
    serializer.serialize(&query("c", 1))?;

    let stats = serializer.cache_stats().expect("cached serializer");
    assert_eq!(stats.entries, 2);

    let a_third = serializer.serialize(&query("a", 1))?;
    assert!(Arc::ptr_eq(&a, &a_third));
    serializer.serialize(&query("b", 1))?;
    assert_eq!(
        serializer.cache_stats().map(|s| s.misses),
        Some(4),
        "`b` must have been evicted"
    );
    Ok(())
}

#[test]
fn test_native_examples_released() -> featwire::Result<()> {
    let engine = ReferenceEngine::new();
    let serializer = Featwire::builder().build_cached::<Query>(Arc::new(engine.clone()))?;

    let held = serializer.serialize(&query("x", 1))?;
    serializer.serialize(&query("y", 1))?;
    assert_eq!(engine.live_examples(), 2);

    serializer.clear_cache();
    assert_eq!(engine.live_examples(), 1);

    drop(held);
    assert_eq!(engine.live_examples(), 0);
    Ok(())
}

#[test]
fn test_uncached_results_released() -> featwire::Result<()> {
    let engine = ReferenceEngine::new();
    let serializer = Featwire::builder().build::<Query>(Arc::new(engine.clone()))?;
    let out = serializer.serialize(&query("x", 1))?;
    assert_eq!(engine.live_examples(), 1);
    assert!(out.native().is_some_and(|n| n.is_leased()));
    drop(out);
    assert_eq!(engine.live_examples(), 0);
    assert_eq!(serializer.cache_stats(), None);
    Ok(())
}

#[test]
fn test_zero_cache_size_rejected() {
    let result = Featwire::builder()
        .cache_max_entries(0)
        .build_cached::<Query>(Arc::new(ReferenceEngine::new()));
    assert!(matches!(
        result,
        Err(FeatwireError::Config(ConfigError::InvalidCacheSize(0)))
    ));

    let direct = ExampleCache::<Query, String>::new(DefaultComparer, Some(0));
    assert_eq!(direct.err(), Some(ConfigError::InvalidCacheSize(0)));
}

#[test]
fn test_compute_errors_are_not_cached() -> featwire::Result<()> {
    let cache = ExampleCache::<u32, String>::new(DefaultComparer, None)?;
    let calls = AtomicUsize::new(0);

    let failed = cache.get_or_compute(&7, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(FeatwireError::Internal("boom".to_string()))
    });
    assert!(failed.is_err());
    assert!(cache.is_empty());

    let value = cache.get_or_compute(&7, |n| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("seven={n}"))
    })?;
    let again = cache.get_or_compute(&7, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(String::new())
    })?;

    assert_eq!(value.as_str(), "seven=7");
    assert!(Arc::ptr_eq(&value, &again));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_concurrent_access() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .text(true)
        .build_cached::<Query>(Arc::new(ReferenceEngine::new()))?;

    let queries: Vec<Query> = (0..400).map(|i| query("concurrent", i % 20)).collect();
    let results = serializer.serialize_batch(&queries)?;

    for (query, result) in queries.iter().zip(&results) {
        let expected = format!("|q concurrent page:{}", query.page);
        let expected = if query.page == 0 { "|q concurrent".to_string() } else { expected };
        assert_eq!(result.text(), Some(expected.as_str()));
    }

    let stats = serializer.cache_stats().expect("cached serializer");
    assert_eq!(stats.entries, 20);
    assert_eq!(stats.hits + stats.misses, 400);

    let pointers: Vec<usize> = (0..20u32)
        .into_par_iter()
        .map(|page| serializer.serialize(&query("concurrent", page)).map(|r| Arc::as_ptr(&r) as usize))
        .collect::<featwire::Result<_>>()?;
    for (page, pointer) in pointers.iter().enumerate() {
        let cached = results.get(page).expect("first twenty are distinct");
        assert_eq!(*pointer, Arc::as_ptr(cached) as usize);
    }
    Ok(())
}
