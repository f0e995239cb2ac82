//! Processor decision nodes.
//!
//! A decision node applies, in order:
//!
//! 1. its condition, rejecting the input when the condition is `false`;
//! 2. its subordinate processors, taking the first one that does not reject
//!    as the working value (the node rejects if all of them reject);
//! 3. its transform, applied to the working value.
//!
//! A node with none of the three is the void processor and compiles to
//! `None`; callers treat that as "pass every input through unchanged".

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::trace;

use super::evaluator::{
    AsyncEvaluator, Evaluator, Passthrough, Predicate, Processor, SyncEvaluator, Transform,
};

pub struct SyncDecision {
    condition: Option<Arc<dyn SyncEvaluator<bool>>>,
    processors: Vec<Arc<dyn SyncEvaluator<Option<Value>>>>,
    transform: Option<Arc<dyn SyncEvaluator<Value>>>,
}

impl SyncEvaluator<Option<Value>> for SyncDecision {
    fn evaluate(&self, input: &Value) -> Result<Option<Value>> {
        if let Some(condition) = &self.condition {
            if !condition.evaluate(input)? {
                return Ok(None);
            }
        }

        let working = if self.processors.is_empty() {
            Cow::Borrowed(input)
        } else {
            let mut first = None;
            for processor in &self.processors {
                if let Some(value) = processor.evaluate(input)? {
                    first = Some(value);
                    break;
                }
            }
            match first {
                Some(value) => Cow::Owned(value),
                None => return Ok(None),
            }
        };

        match &self.transform {
            Some(transform) => transform.evaluate(&working).map(Some),
            None => Ok(Some(working.into_owned())),
        }
    }
}

/// Decision node with at least one asynchronous part. Synchronous parts are
/// called directly.
pub struct AsyncDecision {
    condition: Option<Predicate>,
    processors: Vec<Processor>,
    transform: Option<Transform>,
}

#[async_trait]
impl AsyncEvaluator<Option<Value>> for AsyncDecision {
    async fn evaluate(&self, input: &Value) -> Result<Option<Value>> {
        if let Some(condition) = &self.condition {
            if !condition.evaluate(input).await? {
                return Ok(None);
            }
        }

        let working = if self.processors.is_empty() {
            Cow::Borrowed(input)
        } else {
            let mut first = None;
            for processor in &self.processors {
                if let Some(value) = processor.evaluate(input).await? {
                    first = Some(value);
                    break;
                }
            }
            match first {
                Some(value) => Cow::Owned(value),
                None => return Ok(None),
            }
        };

        match &self.transform {
            Some(transform) => transform.evaluate(&working).await.map(Some),
            None => Ok(Some(working.into_owned())),
        }
    }
}

/// Resolves void entries in a subordinate list.
///
/// A void processor never rejects, so it ends the "first non-rejecting wins"
/// search: everything after it is unreachable. A list that is void from the
/// start is equivalent to having no subordinates at all.
fn resolve_void_processors(path: &str, processors: Vec<Option<Processor>>) -> Vec<Processor> {
    let mut resolved = Vec::with_capacity(processors.len());
    let total = processors.len();
    for (index, processor) in processors.into_iter().enumerate() {
        match processor {
            Some(processor) => resolved.push(processor),
            None => {
                if index + 1 < total {
                    trace!(
                        path = %path,
                        index,
                        unreachable = total - index - 1,
                        "Void processor shadows the rest of the list"
                    );
                }
                if resolved.is_empty() {
                    return Vec::new();
                }
                resolved.push(Evaluator::from_sync(Passthrough));
                break;
            }
        }
    }
    resolved
}

/// Builds a decision node from compiled parts.
///
/// `processors` holds the compiled subordinates in declared order, with
/// `None` for void ones.
pub fn decision(
    path: &str,
    condition: Option<Predicate>,
    processors: Vec<Option<Processor>>,
    transform: Option<Transform>,
) -> Option<Processor> {
    let processors = resolve_void_processors(path, processors);

    if condition.is_none() && transform.is_none() {
        match processors.len() {
            0 => return None,
            1 => return processors.into_iter().next(),
            _ => {}
        }
    }

    let all_sync = condition.as_ref().is_none_or(Evaluator::is_sync)
        && transform.as_ref().is_none_or(Evaluator::is_sync)
        && processors.iter().all(Evaluator::is_sync);

    if all_sync {
        let sync_parts = (
            condition.as_ref().and_then(|c| c.as_sync().cloned()),
            processors
                .iter()
                .filter_map(|p| p.as_sync().cloned())
                .collect::<Vec<_>>(),
            transform.as_ref().and_then(|t| t.as_sync().cloned()),
        );
        return Some(Evaluator::from_sync(SyncDecision {
            condition: sync_parts.0,
            processors: sync_parts.1,
            transform: sync_parts.2,
        }));
    }

    Some(Evaluator::from_async(AsyncDecision {
        condition,
        processors,
        transform,
    }))
}

/// Processor that only filters.
pub fn filter(condition: Predicate) -> Processor {
    decision("filter", Some(condition), Vec::new(), None)
        .unwrap_or_else(|| Evaluator::from_sync(Passthrough))
}

/// Processor that only rewrites.
pub fn rewrite(transform: Transform) -> Processor {
    decision("rewrite", None, Vec::new(), Some(transform))
        .unwrap_or_else(|| Evaluator::from_sync(Passthrough))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CallCounter, add, add_async, constant, constant_async, reject_all};
    use serde_json::json;

    #[test]
    fn test_void_node_is_none() {
        assert!(decision("void", None, vec![], None).is_none());
        assert!(decision("void", None, vec![None, None], None).is_none());
    }

    #[tokio::test]
    async fn test_false_condition_skips_everything() {
        let counter = CallCounter::new();
        let node = decision(
            "node",
            Some(constant(false)),
            vec![Some(counter.processor()), Some(counter.async_processor())],
            Some(counter.transform()),
        )
        .unwrap();

        assert_eq!(node.evaluate(&json!(5)).await.unwrap(), None);
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn test_async_false_condition_skips_everything() {
        let counter = CallCounter::new();
        let node = decision(
            "node",
            Some(constant_async(false)),
            vec![Some(counter.processor())],
            Some(counter.transform()),
        )
        .unwrap();

        assert!(!node.is_sync());
        assert_eq!(node.evaluate(&json!(5)).await.unwrap(), None);
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn test_first_non_rejecting_subordinate_wins() {
        let node = decision(
            "node",
            None,
            vec![
                Some(reject_all()),
                Some(rewrite(add(10.0))),
                Some(rewrite(add(100.0))),
            ],
            Some(add(1.0)),
        )
        .unwrap();

        assert!(node.is_sync());
        assert_eq!(node.evaluate(&json!(0.0)).await.unwrap(), Some(json!(11.0)));
    }

    #[tokio::test]
    async fn test_all_subordinates_reject() {
        let counter = CallCounter::new();
        let node = decision(
            "node",
            Some(constant(true)),
            vec![Some(reject_all()), Some(reject_all())],
            Some(counter.transform()),
        )
        .unwrap();

        assert_eq!(node.evaluate(&json!(1)).await.unwrap(), None);
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn test_void_subordinate_passes_through() {
        let node = decision(
            "node",
            None,
            vec![Some(reject_all()), None, Some(rewrite(add(100.0)))],
            Some(add_async(1.0)),
        )
        .unwrap();

        assert!(!node.is_sync());
        assert_eq!(node.evaluate(&json!(1.0)).await.unwrap(), Some(json!(2.0)));
    }

    #[test]
    fn test_single_subordinate_collapses() {
        let node = decision("node", None, vec![Some(reject_all())], None).unwrap();
        assert_eq!(node.evaluate_sync(&json!(1)).unwrap(), None);
    }

    #[test]
    fn test_filter_and_rewrite() {
        let positive = filter(Predicate::sync_fn(|v| Ok(v.as_f64().unwrap_or(0.0) > 0.0)));
        assert_eq!(positive.evaluate_sync(&json!(2)).unwrap(), Some(json!(2)));
        assert_eq!(positive.evaluate_sync(&json!(-2)).unwrap(), None);

        let plus_one = rewrite(add(1.0));
        assert_eq!(plus_one.evaluate_sync(&json!(1.0)).unwrap(), Some(json!(2.0)));
    }
}
