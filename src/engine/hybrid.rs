//! Sync/async shape selection for combinators.
//!
//! Combinators never look at the runtime behaviour of their operands, only at
//! the static [`Strategy`] each operand was built with. Given the same operand
//! strategies the selection below always yields the same [`Shape`]:
//!
//! | left  | right | shape            |
//! |-------|-------|------------------|
//! | sync  | sync  | `Sync`           |
//! | async | async | `Async`          |
//! | sync  | async | `SyncThenAsync`  |
//! | async | sync  | `AsyncThenSync`  |
//!
//! Lists longer than two are either fully synchronous or compiled as one
//! asynchronous combinator. The asynchronous list combinators still call their
//! synchronous members directly, so no member is wrapped in a future it does
//! not need.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::evaluator::{AsyncEvaluator, Evaluator, SyncEvaluator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// No asynchronous machinery at all.
    Sync,
    /// Every operand is awaited in turn.
    Async,
    /// Two operands: the left is called directly, the right is awaited.
    SyncThenAsync,
    /// Two operands: the left is awaited, the right is called directly.
    AsyncThenSync,
}

impl Shape {
    /// Strategy of the combinator built with this shape.
    pub fn strategy(&self) -> Strategy {
        match self {
            Shape::Sync => Strategy::Sync,
            _ => Strategy::Async,
        }
    }
}

pub fn pair_shape(left: Strategy, right: Strategy) -> Shape {
    match (left, right) {
        (Strategy::Sync, Strategy::Sync) => Shape::Sync,
        (Strategy::Async, Strategy::Async) => Shape::Async,
        (Strategy::Sync, Strategy::Async) => Shape::SyncThenAsync,
        (Strategy::Async, Strategy::Sync) => Shape::AsyncThenSync,
    }
}

pub fn list_shape(strategies: &[Strategy]) -> Shape {
    match strategies {
        [left, right] => pair_shape(*left, *right),
        _ if strategies.iter().all(|strategy| *strategy == Strategy::Sync) => Shape::Sync,
        _ => Shape::Async,
    }
}

/// Shape for a list of evaluators.
pub fn shape_of<O: Send + 'static>(evaluators: &[Evaluator<O>]) -> Shape {
    let strategies: Vec<Strategy> = evaluators.iter().map(Evaluator::strategy).collect();
    list_shape(&strategies)
}

/// A pair of evaluators split by strategy, ready for a pair combinator.
pub enum Pair<O> {
    Sync(Arc<dyn SyncEvaluator<O>>, Arc<dyn SyncEvaluator<O>>),
    Async(Arc<dyn AsyncEvaluator<O>>, Arc<dyn AsyncEvaluator<O>>),
    SyncThenAsync(Arc<dyn SyncEvaluator<O>>, Arc<dyn AsyncEvaluator<O>>),
    AsyncThenSync(Arc<dyn AsyncEvaluator<O>>, Arc<dyn SyncEvaluator<O>>),
}

impl<O> Pair<O> {
    pub fn split(left: Evaluator<O>, right: Evaluator<O>) -> Self {
        match (left, right) {
            (Evaluator::Sync(left), Evaluator::Sync(right)) => Pair::Sync(left, right),
            (Evaluator::Async(left), Evaluator::Async(right)) => Pair::Async(left, right),
            (Evaluator::Sync(left), Evaluator::Async(right)) => Pair::SyncThenAsync(left, right),
            (Evaluator::Async(left), Evaluator::Sync(right)) => Pair::AsyncThenSync(left, right),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Pair::Sync(..) => Shape::Sync,
            Pair::Async(..) => Shape::Async,
            Pair::SyncThenAsync(..) => Shape::SyncThenAsync,
            Pair::AsyncThenSync(..) => Shape::AsyncThenSync,
        }
    }
}

/// Unwraps a list known to be fully synchronous.
pub(crate) fn all_sync<O>(evaluators: Vec<Evaluator<O>>) -> Option<Vec<Arc<dyn SyncEvaluator<O>>>> {
    evaluators
        .into_iter()
        .map(|evaluator| match evaluator {
            Evaluator::Sync(inner) => Some(inner),
            Evaluator::Async(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::evaluator::Predicate;

    #[test]
    fn test_pair_shape_table() {
        assert_eq!(pair_shape(Strategy::Sync, Strategy::Sync), Shape::Sync);
        assert_eq!(pair_shape(Strategy::Async, Strategy::Async), Shape::Async);
        assert_eq!(
            pair_shape(Strategy::Sync, Strategy::Async),
            Shape::SyncThenAsync
        );
        assert_eq!(
            pair_shape(Strategy::Async, Strategy::Sync),
            Shape::AsyncThenSync
        );
    }

    #[test]
    fn test_list_shape_coarse_for_long_lists() {
        use Strategy::*;
        assert_eq!(list_shape(&[]), Shape::Sync);
        assert_eq!(list_shape(&[Sync]), Shape::Sync);
        assert_eq!(list_shape(&[Async]), Shape::Async);
        assert_eq!(list_shape(&[Sync, Sync, Sync]), Shape::Sync);
        assert_eq!(list_shape(&[Sync, Async, Sync]), Shape::Async);
        assert_eq!(list_shape(&[Async, Sync]), Shape::AsyncThenSync);
    }

    #[test]
    fn test_shape_is_stable_for_same_operands() {
        let sync = Predicate::sync_fn(|_| Ok(true));
        let asynchronous = Predicate::async_fn(|_| async { Ok(true) });
        let operands = vec![sync.clone(), asynchronous.clone()];

        let first = shape_of(&operands);
        for _ in 0..8 {
            assert_eq!(shape_of(&operands), first);
        }
        assert_eq!(Pair::split(sync, asynchronous).shape(), first);
    }

    #[test]
    fn test_all_sync_unwraps_only_sync_lists() {
        let sync = Predicate::sync_fn(|_| Ok(true));
        let asynchronous = Predicate::async_fn(|_| async { Ok(true) });
        assert_eq!(all_sync(vec![sync.clone(), sync.clone()]).map(|v| v.len()), Some(2));
        assert!(all_sync(vec![sync, asynchronous]).is_none());
    }
}
