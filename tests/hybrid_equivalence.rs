//! Integration tests checking that every mix of synchronous and asynchronous
//! operands gives the same results as the fully synchronous build

use rulemix::engine::hybrid::Strategy;
use rulemix::engine::predicate_group::{GroupKind, group};
use rulemix::engine::processor_node::decision;
use rulemix::engine::transform_sequence::sequence;
use rulemix::engine::{Predicate, Processor, Transform};
use serde_json::{Value, json};

const MEMBERS: usize = 3;

fn is_async(mask: usize, index: usize) -> bool {
    mask & (1 << index) != 0
}

fn above(limit: f64, asynchronous: bool) -> Predicate {
    if asynchronous {
        Predicate::async_fn(move |value: Value| async move {
            Ok(value.as_f64().is_some_and(|number| number > limit))
        })
    } else {
        Predicate::sync_fn(move |value| Ok(value.as_f64().is_some_and(|number| number > limit)))
    }
}

fn times(factor: f64, offset: f64, asynchronous: bool) -> Transform {
    if asynchronous {
        Transform::async_fn(move |value: Value| async move {
            Ok(json!(value.as_f64().unwrap_or_default() * factor + offset))
        })
    } else {
        Transform::sync_fn(move |value| Ok(json!(value.as_f64().unwrap_or_default() * factor + offset)))
    }
}

fn below(limit: f64, asynchronous: bool) -> Processor {
    if asynchronous {
        Processor::async_fn(move |value: Value| async move {
            Ok(value.as_f64().is_some_and(|n| n < limit).then_some(value))
        })
    } else {
        Processor::sync_fn(move |value| {
            Ok(value.as_f64().is_some_and(|n| n < limit).then(|| value.clone()))
        })
    }
}

fn expected_strategy(mask: usize) -> Strategy {
    if mask == 0 { Strategy::Sync } else { Strategy::Async }
}

fn inputs() -> Vec<Value> {
    [-5.0, 0.0, 1.5, 3.0, 7.0, 12.0, 100.0]
        .into_iter()
        .map(|number| json!(number))
        .collect()
}

#[tokio::test]
async fn test_groups_agree_across_strategies() {
    let kinds = [
        GroupKind::All,
        GroupKind::Any,
        GroupKind::AtLeast(2),
        GroupKind::Between { at_least: 1, at_most: 2 },
    ];
    let limits = [1.0, 5.0, 10.0];

    for kind in kinds {
        let build = |mask: usize| {
            let members = limits
                .iter()
                .enumerate()
                .map(|(index, limit)| above(*limit, is_async(mask, index)))
                .collect();
            group(kind, members).unwrap()
        };
        let reference = build(0);

        for mask in 0..(1 << MEMBERS) {
            let candidate = build(mask);
            assert_eq!(candidate.strategy(), expected_strategy(mask), "{kind} mask {mask}");
            for input in inputs() {
                assert_eq!(
                    reference.evaluate(&input).await.unwrap(),
                    candidate.evaluate(&input).await.unwrap(),
                    "{kind} mask {mask} input {input}"
                );
            }
        }
    }
}

#[tokio::test]
async fn test_sequences_agree_across_strategies() {
    let steps = [(2.0, 1.0), (-1.0, 0.5), (3.0, -2.0)];
    let build = |mask: usize| {
        let members = steps
            .iter()
            .enumerate()
            .map(|(index, (factor, offset))| times(*factor, *offset, is_async(mask, index)))
            .collect();
        sequence(members).unwrap()
    };
    let reference = build(0);

    for mask in 0..(1 << MEMBERS) {
        let candidate = build(mask);
        assert_eq!(candidate.strategy(), expected_strategy(mask), "mask {mask}");
        for input in inputs() {
            assert_eq!(
                reference.evaluate(&input).await.unwrap(),
                candidate.evaluate(&input).await.unwrap(),
                "mask {mask} input {input}"
            );
        }
    }
}

#[tokio::test]
async fn test_decisions_agree_across_strategies() {
    let build = |mask: usize| {
        decision(
            "root",
            Some(above(0.0, is_async(mask, 0))),
            vec![Some(below(50.0, is_async(mask, 1)))],
            Some(times(2.0, 0.0, is_async(mask, 2))),
        )
        .unwrap()
    };
    let reference = build(0);

    for mask in 0..(1 << MEMBERS) {
        let candidate = build(mask);
        assert_eq!(candidate.strategy(), expected_strategy(mask), "mask {mask}");
        for input in inputs() {
            assert_eq!(
                reference.evaluate(&input).await.unwrap(),
                candidate.evaluate(&input).await.unwrap(),
                "mask {mask} input {input}"
            );
        }
    }
}

#[test]
fn test_sync_builds_run_without_runtime() {
    let predicate = group(GroupKind::Any, vec![above(1.0, false), above(5.0, false)]).unwrap();
    assert!(predicate.evaluate_sync(&json!(3.0)).unwrap());

    let mixed = group(GroupKind::Any, vec![above(1.0, false), above(5.0, true)]).unwrap();
    assert!(mixed.evaluate_sync(&json!(3.0)).is_err());
}
