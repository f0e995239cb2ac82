//! Left-to-right transform chains.
//!
//! The output of each step is the input of the next. A failing step stops
//! the chain immediately; nothing after it runs.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::evaluator::{AsyncEvaluator, Evaluator, SyncEvaluator, Transform};
use super::hybrid::{Pair, Shape, all_sync, shape_of};

pub struct SyncSequence {
    steps: Vec<Arc<dyn SyncEvaluator<Value>>>,
}

impl SyncEvaluator<Value> for SyncSequence {
    fn evaluate(&self, input: &Value) -> Result<Value> {
        let mut steps = self.steps.iter();
        let Some(first) = steps.next() else {
            return Ok(input.clone());
        };
        let mut value = first.evaluate(input)?;
        for step in steps {
            value = step.evaluate(&value)?;
        }
        Ok(value)
    }
}

pub struct AsyncSequence {
    steps: Vec<Transform>,
}

#[async_trait]
impl AsyncEvaluator<Value> for AsyncSequence {
    async fn evaluate(&self, input: &Value) -> Result<Value> {
        let mut steps = self.steps.iter();
        let Some(first) = steps.next() else {
            return Ok(input.clone());
        };
        let mut value = first.evaluate(input).await?;
        for step in steps {
            value = step.evaluate(&value).await?;
        }
        Ok(value)
    }
}

pub struct AsyncPairSequence {
    first: Arc<dyn AsyncEvaluator<Value>>,
    second: Arc<dyn AsyncEvaluator<Value>>,
}

#[async_trait]
impl AsyncEvaluator<Value> for AsyncPairSequence {
    async fn evaluate(&self, input: &Value) -> Result<Value> {
        let value = self.first.evaluate(input).await?;
        self.second.evaluate(&value).await
    }
}

pub struct SyncThenAsyncSequence {
    first: Arc<dyn SyncEvaluator<Value>>,
    second: Arc<dyn AsyncEvaluator<Value>>,
}

#[async_trait]
impl AsyncEvaluator<Value> for SyncThenAsyncSequence {
    async fn evaluate(&self, input: &Value) -> Result<Value> {
        let value = self.first.evaluate(input)?;
        self.second.evaluate(&value).await
    }
}

pub struct AsyncThenSyncSequence {
    first: Arc<dyn AsyncEvaluator<Value>>,
    second: Arc<dyn SyncEvaluator<Value>>,
}

#[async_trait]
impl AsyncEvaluator<Value> for AsyncThenSyncSequence {
    async fn evaluate(&self, input: &Value) -> Result<Value> {
        let value = self.first.evaluate(input).await?;
        self.second.evaluate(&value)
    }
}

/// Chains `steps` left to right.
///
/// Returns `None` for an empty chain, which is the identity transform.
pub fn sequence(steps: Vec<Transform>) -> Option<Transform> {
    if steps.len() <= 1 {
        return steps.into_iter().next();
    }

    match shape_of(&steps) {
        Shape::Sync => {
            let steps = all_sync(steps)?;
            Some(Evaluator::from_sync(SyncSequence { steps }))
        }
        _ if steps.len() == 2 => {
            let mut steps = steps.into_iter();
            let (first, second) = (steps.next()?, steps.next()?);
            Some(match Pair::split(first, second) {
                Pair::Sync(first, second) => Evaluator::from_sync(SyncSequence {
                    steps: vec![first, second],
                }),
                Pair::Async(first, second) => {
                    Evaluator::from_async(AsyncPairSequence { first, second })
                }
                Pair::SyncThenAsync(first, second) => {
                    Evaluator::from_async(SyncThenAsyncSequence { first, second })
                }
                Pair::AsyncThenSync(first, second) => {
                    Evaluator::from_async(AsyncThenSyncSequence { first, second })
                }
            })
        }
        _ => Some(Evaluator::from_async(AsyncSequence { steps })),
    }
}
