//! Integration tests for placeholder substitution and the mixer factory

use rulemix::config::{MixingSettings, ReconfigureRetries};
use rulemix::engine::node::Node;
use rulemix::engine::{Compiler, Family, NodeDef, Predicate, Transform, try_set_placeholder};
use rulemix::errors::ReconfigureError;
use rulemix::mixer::MixerFactory;
use rulemix::monitor::MemoryMonitor;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn compiler() -> Compiler {
    Compiler::new(Arc::new(MemoryMonitor::new()))
}

fn contains(needle: &'static str) -> NodeDef {
    NodeDef::predicate(Predicate::sync_fn(move |value| {
        Ok(value.as_str().is_some_and(|text| text.contains(needle)))
    }))
}

fn scale(factor: f64) -> NodeDef {
    NodeDef::processor_mixer(
        None,
        Some(NodeDef::rewrite(NodeDef::transform(Transform::sync_fn(
            move |value| Ok(json!(value.as_f64().unwrap_or_default() * factor)),
        )))),
    )
}

#[tokio::test]
async fn test_placeholder_in_any_group() {
    let compiler = compiler();
    let root = Node::seal(
        "root",
        NodeDef::all(vec![
            NodeDef::any(vec![contains("A"), NodeDef::placeholder(Family::Predicate)]),
            contains("x"),
        ]),
    );
    let before = compiler.compile_predicate(&root).unwrap().unwrap();

    let updated = try_set_placeholder(&root, "root/children/0/children/1", &contains("B"), &compiler)
        .unwrap()
        .unwrap();
    let after = compiler.compile_predicate(&updated).unwrap().unwrap();

    assert!(!before.evaluate(&json!("Bx")).await.unwrap());
    assert!(after.evaluate(&json!("Bx")).await.unwrap());
    for input in ["Ax", "A", "x", "Cx"] {
        assert_eq!(
            before.evaluate(&json!(input)).await.unwrap(),
            after.evaluate(&json!(input)).await.unwrap(),
            "unaffected input {input}"
        );
    }

    // The sibling branch is shared, not rebuilt.
    assert!(Arc::ptr_eq(root.children()[1], updated.children()[1]));
    assert!(root.find("root/children/0/children/1").unwrap().is_placeholder());
}

#[tokio::test]
async fn test_factory_swaps_and_resets() {
    let factory = MixerFactory::new(
        NodeDef::pipeline(
            NodeDef::composite_mixer(vec![NodeDef::placeholder(Family::Mixer), scale(1.0)]),
            None,
            MixingSettings::default(),
        ),
        compiler(),
    )
    .unwrap()
    .with_retries(ReconfigureRetries::default());

    let run = |factory: &MixerFactory| {
        let pipeline = factory.build().unwrap();
        async move {
            pipeline
                .mix(json!(2.0), None, CancellationToken::new())
                .await
                .outputs
        }
    };

    assert_eq!(run(&factory).await, vec![json!(2.0)]);

    assert!(factory.try_set_placeholder("root/mixer/children/0", scale(3.0)).unwrap());
    assert_eq!(run(&factory).await, vec![json!(6.0)]);

    // Substituting the same fragment again is observably the same tree.
    assert!(factory.try_set_placeholder("root/mixer/children/0", scale(3.0)).unwrap());
    assert_eq!(run(&factory).await, vec![json!(6.0)]);

    // Unknown paths leave the current tree in place.
    let before = factory.current();
    assert!(!factory.try_set_placeholder("root/mixer/children/9", scale(7.0)).unwrap());
    assert!(Arc::ptr_eq(&before, &factory.current()));

    // A second substitution at the same path replaces the first.
    assert!(factory.try_set_placeholder("root/mixer/children/0", scale(5.0)).unwrap());
    assert_eq!(run(&factory).await, vec![json!(10.0)]);

    factory.reset();
    assert!(Arc::ptr_eq(factory.initial(), &factory.current()));
    assert_eq!(run(&factory).await, vec![json!(2.0)]);
}

#[test]
fn test_factory_rejects_mismatched_fragment() {
    let factory = MixerFactory::new(
        NodeDef::pipeline(
            NodeDef::composite_mixer(vec![NodeDef::placeholder(Family::Mixer), scale(1.0)]),
            None,
            MixingSettings::default(),
        ),
        compiler(),
    )
    .unwrap();
    let before = factory.current();

    let error = factory
        .try_set_placeholder("root/mixer/children/0", contains("A"))
        .unwrap_err();
    assert!(matches!(error, ReconfigureError::FamilyMismatch { .. }));
    assert!(Arc::ptr_eq(&before, &factory.current()));
}

#[tokio::test]
async fn test_concurrent_substitutions_all_land() {
    let factory = Arc::new(
        MixerFactory::new(
            NodeDef::pipeline(
                NodeDef::composite_mixer(vec![
                    NodeDef::placeholder(Family::Mixer),
                    NodeDef::placeholder(Family::Mixer),
                    NodeDef::placeholder(Family::Mixer),
                    NodeDef::placeholder(Family::Mixer),
                    scale(1.0),
                ]),
                None,
                MixingSettings::default(),
            ),
            compiler(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|index| {
            let factory = Arc::clone(&factory);
            tokio::spawn(async move {
                factory
                    .try_set_placeholder(
                        &format!("root/mixer/children/{index}"),
                        scale(index as f64 + 2.0),
                    )
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert!(factory.current().placeholders().is_empty());
}
