#![allow(missing_docs)]

use std::sync::Arc;

use featwire::engine::ParsedLabel;
use featwire::{
    ContextualBanditLabel, FeatureExample, Featwire, FeatwireError, LabelTarget, ReferenceEngine,
};
use pretty_assertions::assert_eq;

#[derive(FeatureExample)]
struct Article {
    #[featwire(label)]
    label: Option<ContextualBanditLabel>,
    #[featwire(namespace = "a", strings = "escape")]
    topic: String,
}

#[derive(FeatureExample)]
struct Session {
    #[featwire(namespace = "u")]
    age: u32,
    #[featwire(action_dependent)]
    articles: Vec<Article>,
}

fn article(topic: &str) -> Article {
    Article {
        label: None,
        topic: topic.to_string(),
    }
}

#[test]
fn test_shared_line_then_candidates_in_order() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .text(true)
        .build::<Session>(Arc::new(ReferenceEngine::new()))?;
    assert!(serializer.compiled().is_multi_line());

    let session = Session {
        age: 30,
        articles: vec![article("sports"), article("news"), article("tech")],
    };
    let out = serializer.serialize(&session)?;

    assert!(out.is_multi_line());
    assert_eq!(out.text(), Some("shared |u age:30\n|a sports\n|a news\n|a tech"));
    assert_eq!(out.lines().len(), 4);
    assert_eq!(out.actions().len(), 3);
    assert_eq!(
        out.shared().and_then(|line| line.label()).copied(),
        Some(ParsedLabel::Shared)
    );
    assert!(serializer.validate(&session)?.is_clean());
    Ok(())
}

#[test]
fn test_candidate_labels() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .text(true)
        .build::<Session>(Arc::new(ReferenceEngine::new()))?;

    let mut labeled = article("news");
    labeled.label = Some(ContextualBanditLabel {
        action: 2,
        cost: 1.0,
        probability: 0.5,
    });
    let session = Session {
        age: 30,
        articles: vec![article("sports"), labeled],
    };

    let own = serializer.serialize(&session)?;
    assert_eq!(own.text(), Some("shared |u age:30\n|a sports\n2:1:0.5 |a news"));

    let call_label = ContextualBanditLabel {
        action: 1,
        cost: 0.0,
        probability: 0.25,
    };
    let targeted = serializer.serialize_labeled(
        &session,
        LabelTarget::Action {
            index: 0,
            label: &call_label,
        },
    )?;
    assert_eq!(
        targeted.text(),
        Some("shared |u age:30\n1:0:0.25 |a sports\n2:1:0.5 |a news")
    );
    Ok(())
}

#[test]
fn test_label_target_errors() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .text(true)
        .build::<Session>(Arc::new(ReferenceEngine::new()))?;
    let session = Session {
        age: 1,
        articles: vec![article("x")],
    };
    let label = ContextualBanditLabel {
        action: 1,
        cost: 1.0,
        probability: 1.0,
    };

    let out_of_range = serializer.serialize_labeled(&session, LabelTarget::Action { index: 1, label: &label });
    assert!(matches!(out_of_range, Err(FeatwireError::Label(_))));

    let whole = serializer.serialize_labeled(&session, LabelTarget::Example(&label));
    assert!(matches!(whole, Err(FeatwireError::Label(_))));
    Ok(())
}

#[test]
fn test_empty_candidates_still_emit_shared_line() -> featwire::Result<()> {
    let out = Featwire::builder()
        .text(true)
        .build::<Session>(Arc::new(ReferenceEngine::new()))?
        .serialize(&Session {
            age: 5,
            articles: Vec::new(),
        })?;
    assert_eq!(out.text(), Some("shared |u age:5"));
    assert!(out.actions().is_empty());
    Ok(())
}

#[derive(FeatureExample)]
struct OptionalSession {
    #[featwire(action_dependent)]
    articles: Option<Vec<Article>>,
}

#[test]
fn test_optional_candidates() -> featwire::Result<()> {
    let serializer = Featwire::builder()
        .text(true)
        .build::<OptionalSession>(Arc::new(ReferenceEngine::new()))?;

    let none = serializer.serialize(&OptionalSession { articles: None })?;
    assert_eq!(none.text(), Some("shared"));

    let some = serializer.serialize(&OptionalSession {
        articles: Some(vec![article("a b")]),
    })?;
    assert_eq!(some.text(), Some("shared\n|a a_b"));
    Ok(())
}
