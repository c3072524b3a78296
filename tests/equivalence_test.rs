#![allow(missing_docs)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use featwire::text::parse_lines;
use featwire::validate::cross_validate;
use featwire::{
    FeatureEngine, FeatureEnum, FeatureExample, Featwire, FeatwireError, LabelTarget,
    ReferenceEngine, SimpleLabel,
};
use pretty_assertions::assert_eq;

#[derive(FeatureEnum)]
enum Weekday {
    Mon,
    Tue,
    Wed,
}

#[derive(FeatureExample)]
struct Context {
    #[featwire(namespace = "ctx", group = 'c')]
    day: Weekday,
    #[featwire(namespace = "ctx", group = 'c', enumerize)]
    hour: u8,
}

#[derive(FeatureExample)]
struct Listing {
    #[featwire(label)]
    label: Option<SimpleLabel>,
    #[featwire(namespace = "item")]
    price: f64,
    #[featwire(namespace = "item")]
    discounted: bool,
    #[featwire(namespace = "item", strings = "split")]
    title: String,
    #[featwire(namespace = "counts")]
    counts: HashMap<String, u32>,
    #[featwire(namespace = "labels")]
    labels: HashSet<String>,
    #[featwire(namespace = "pairs")]
    pairs: Vec<(u32, f32)>,
    #[featwire(namespace = "hist", anchor)]
    history: VecDeque<f32>,
    #[featwire(namespace = "vec")]
    embedding: Box<[f32]>,
    #[featwire(group = 'c', namespace = "ctx")]
    context: Option<Context>,
    #[featwire]
    plain: u16,
}

fn listing(seed: u32) -> Listing {
    let f = seed as f32;
    Listing {
        label: (seed % 2 == 0).then(|| SimpleLabel::weighted(f, 0.25)),
        price: f64::from(seed) * 1.25 + 0.1,
        discounted: seed % 3 == 0,
        title: format!("item {seed} | special: offer"),
        counts: HashMap::from([("views".to_string(), seed), ("clicks".to_string(), seed / 2)]),
        labels: HashSet::from(["fresh".to_string(), format!("batch {}", seed % 4)]),
        pairs: vec![(1, 0.5), (seed, f)],
        history: VecDeque::from(vec![f, 0.0, 1e-7, -f]),
        embedding: vec![0.1, 0.2, f].into_boxed_slice(),
        context: (seed % 5 != 0).then(|| Context {
            day: match seed % 3 {
                0 => Weekday::Mon,
                1 => Weekday::Tue,
                _ => Weekday::Wed,
            },
            hour: (seed % 24) as u8,
        }),
        plain: seed as u16,
    }
}

#[test]
fn test_text_parses_back_to_native() -> featwire::Result<()> {
    let engine = ReferenceEngine::with_seed(17);
    let serializer = Featwire::builder()
        .text(true)
        .build::<Listing>(Arc::new(engine.clone()))?;

    for seed in 0..60 {
        let example = listing(seed);
        let out = serializer.serialize(&example)?;
        let text = out.text().expect("text requested");

        let parsed = parse_lines(&engine, text)?;
        assert_eq!(parsed.len(), out.lines().len());
        for (reparsed, native) in parsed.iter().zip(out.lines()) {
            assert_eq!(reparsed.diff(native), Vec::<String>::new(), "line `{text}`");
        }

        let report = cross_validate(&engine, &out)?;
        assert!(report.is_clean(), "{:?}", report.differences);
        assert_eq!(report.lines, 1);
    }
    Ok(())
}

#[test]
fn test_native_only_serializer_validates_with_text() -> featwire::Result<()> {
    let serializer = Featwire::builder().build::<Listing>(Arc::new(ReferenceEngine::new()))?;
    let report = serializer.validate(&listing(7))?;
    assert!(report.is_clean(), "{:?}", report.differences);

    let native_only = serializer.serialize(&listing(7))?;
    assert!(matches!(
        cross_validate(serializer.engine(), &native_only),
        Err(FeatwireError::Validation(_))
    ));
    Ok(())
}

#[test]
fn test_native_matches_between_output_kinds() -> featwire::Result<()> {
    let engine: Arc<dyn FeatureEngine> = Arc::new(ReferenceEngine::new());
    let native = Featwire::builder().build::<Listing>(Arc::clone(&engine))?;
    let both = Featwire::builder().text(true).build::<Listing>(engine)?;

    for seed in [1, 4, 10, 33] {
        let example = listing(seed);
        let left = native.serialize(&example)?;
        let right = both.serialize_labeled(&example, LabelTarget::None)?;
        assert_eq!(left.lines(), right.lines());
    }
    Ok(())
}

#[test]
fn test_label_reaches_both_outputs() -> featwire::Result<()> {
    let engine = ReferenceEngine::new();
    let out = Featwire::builder()
        .text(true)
        .build::<Listing>(Arc::new(engine.clone()))?
        .serialize(&listing(2))?;
    let text = out.text().expect("text requested");
    assert!(text.starts_with("2 0.25 |"), "{text}");
    assert_eq!(
        out.native().and_then(|n| n.label()).copied(),
        Some(engine.parse_label("2 0.25")?)
    );
    Ok(())
}
