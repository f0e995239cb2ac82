//! Threshold groups over predicates.
//!
//! A group counts how many of its members are satisfied and compares the
//! count against `(at_least, at_most)`, where `0` means unbounded on that
//! side:
//!
//! - `(0, 0)` is **All** and stops at the first `false`.
//! - `(1, 0)` is **Any** and stops at the first `true`.
//! - `(k, 0)` with `k > 1` is **AtLeast(k)** and stops as soon as `k` members
//!   are satisfied.
//! - `(lo, hi)` with `hi > 0` is **Between** and stops with `false` as soon as
//!   more than `hi` members are satisfied. `(1, 1)` is **Single**.
//!
//! Members are always evaluated in declared order. The sync and async
//! combinators share one [`GroupTally`], so both strategies short-circuit at
//! exactly the same member.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::evaluator::{AsyncEvaluator, Evaluator, Predicate, SyncEvaluator};
use super::hybrid::{Pair, Shape, all_sync, shape_of};
use crate::monitor::Monitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    All,
    Any,
    AtLeast(usize),
    Between { at_least: usize, at_most: usize },
}

impl GroupKind {
    /// Classifies already validated thresholds.
    pub fn from_thresholds(at_least: usize, at_most: usize) -> Self {
        match (at_least, at_most) {
            (0, 0) => GroupKind::All,
            (1, 0) => GroupKind::Any,
            (k, 0) => GroupKind::AtLeast(k),
            (at_least, at_most) => GroupKind::Between { at_least, at_most },
        }
    }

    pub fn single() -> Self {
        GroupKind::Between {
            at_least: 1,
            at_most: 1,
        }
    }

    pub fn thresholds(&self) -> (usize, usize) {
        match *self {
            GroupKind::All => (0, 0),
            GroupKind::Any => (1, 0),
            GroupKind::AtLeast(k) => (k, 0),
            GroupKind::Between { at_least, at_most } => (at_least, at_most),
        }
    }

    /// Reference semantics over a final count of satisfied members.
    ///
    /// `All` needs the member count because it is the only kind whose
    /// threshold depends on the group size.
    pub fn is_satisfied_by(&self, satisfied: usize, members: usize) -> bool {
        match *self {
            GroupKind::All => satisfied == members,
            GroupKind::Any => satisfied >= 1,
            GroupKind::AtLeast(k) => satisfied >= k,
            GroupKind::Between { at_least, at_most } => {
                satisfied >= at_least && satisfied <= at_most
            }
        }
    }

    pub(crate) fn tally(&self) -> GroupTally {
        GroupTally {
            kind: *self,
            satisfied: 0,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::All => write!(f, "All"),
            GroupKind::Any => write!(f, "Any"),
            GroupKind::AtLeast(k) => write!(f, "AtLeast({k})"),
            GroupKind::Between {
                at_least: 1,
                at_most: 1,
            } => write!(f, "Single"),
            GroupKind::Between { at_least, at_most } => {
                write!(f, "Between({at_least}, {at_most})")
            }
        }
    }
}

/// Enforces `at_most == 0 || at_most >= at_least`.
///
/// Invalid bounds are corrected by raising `at_most` to `at_least` and
/// reported as a warning; construction continues with the corrected values.
pub fn normalize_thresholds(
    path: &str,
    at_least: usize,
    at_most: usize,
    monitor: &dyn Monitor,
) -> (usize, usize) {
    if at_most != 0 && at_most < at_least {
        let message = format!(
            "{path}: at_most ({at_most}) is below at_least ({at_least}), using at_most = {at_least}"
        );
        warn!(path = %path, at_least, at_most, "Correcting group thresholds");
        monitor.warn(&message);
        return (at_least, at_least);
    }
    (at_least, at_most)
}

/// Running count for one group evaluation.
pub(crate) struct GroupTally {
    kind: GroupKind,
    satisfied: usize,
}

impl GroupTally {
    /// Records one member outcome; returns the group result if it is already
    /// decided.
    pub(crate) fn observe(&mut self, outcome: bool) -> Option<bool> {
        if outcome {
            self.satisfied += 1;
        }
        match self.kind {
            GroupKind::All if !outcome => Some(false),
            GroupKind::Any if outcome => Some(true),
            GroupKind::AtLeast(k) if self.satisfied >= k => Some(true),
            GroupKind::Between { at_most, .. } if self.satisfied > at_most => Some(false),
            _ => None,
        }
    }

    /// Result after every member has been observed without a decision.
    pub(crate) fn finish(self) -> bool {
        match self.kind {
            GroupKind::All => true,
            GroupKind::Any => false,
            GroupKind::AtLeast(k) => self.satisfied >= k,
            GroupKind::Between { at_least, .. } => self.satisfied >= at_least,
        }
    }
}

/// Fully synchronous group.
pub struct SyncGroup {
    kind: GroupKind,
    members: Vec<Arc<dyn SyncEvaluator<bool>>>,
}

impl SyncEvaluator<bool> for SyncGroup {
    fn evaluate(&self, input: &Value) -> Result<bool> {
        let mut tally = self.kind.tally();
        for member in &self.members {
            if let Some(decided) = tally.observe(member.evaluate(input)?) {
                return Ok(decided);
            }
        }
        Ok(tally.finish())
    }
}

/// Group with at least one asynchronous member.
///
/// Synchronous members are called directly; only asynchronous members are
/// awaited.
pub struct AsyncGroup {
    kind: GroupKind,
    members: Vec<Predicate>,
}

#[async_trait]
impl AsyncEvaluator<bool> for AsyncGroup {
    async fn evaluate(&self, input: &Value) -> Result<bool> {
        let mut tally = self.kind.tally();
        for member in &self.members {
            if let Some(decided) = tally.observe(member.evaluate(input).await?) {
                return Ok(decided);
            }
        }
        Ok(tally.finish())
    }
}

pub struct AsyncPairGroup {
    kind: GroupKind,
    left: Arc<dyn AsyncEvaluator<bool>>,
    right: Arc<dyn AsyncEvaluator<bool>>,
}

#[async_trait]
impl AsyncEvaluator<bool> for AsyncPairGroup {
    async fn evaluate(&self, input: &Value) -> Result<bool> {
        let mut tally = self.kind.tally();
        if let Some(decided) = tally.observe(self.left.evaluate(input).await?) {
            return Ok(decided);
        }
        if let Some(decided) = tally.observe(self.right.evaluate(input).await?) {
            return Ok(decided);
        }
        Ok(tally.finish())
    }
}

pub struct SyncThenAsyncGroup {
    kind: GroupKind,
    left: Arc<dyn SyncEvaluator<bool>>,
    right: Arc<dyn AsyncEvaluator<bool>>,
}

#[async_trait]
impl AsyncEvaluator<bool> for SyncThenAsyncGroup {
    async fn evaluate(&self, input: &Value) -> Result<bool> {
        let mut tally = self.kind.tally();
        if let Some(decided) = tally.observe(self.left.evaluate(input)?) {
            return Ok(decided);
        }
        if let Some(decided) = tally.observe(self.right.evaluate(input).await?) {
            return Ok(decided);
        }
        Ok(tally.finish())
    }
}

pub struct AsyncThenSyncGroup {
    kind: GroupKind,
    left: Arc<dyn AsyncEvaluator<bool>>,
    right: Arc<dyn SyncEvaluator<bool>>,
}

#[async_trait]
impl AsyncEvaluator<bool> for AsyncThenSyncGroup {
    async fn evaluate(&self, input: &Value) -> Result<bool> {
        let mut tally = self.kind.tally();
        if let Some(decided) = tally.observe(self.left.evaluate(input).await?) {
            return Ok(decided);
        }
        if let Some(decided) = tally.observe(self.right.evaluate(input)?) {
            return Ok(decided);
        }
        Ok(tally.finish())
    }
}

/// Builds the cheapest group evaluator for `members`.
///
/// Returns `None` for an empty group, which places no constraint. A single
/// member under a kind that reduces to that member (`All`, `Any`,
/// `AtLeast(1)`, `Single`, ...) is returned as is.
pub fn group(kind: GroupKind, members: Vec<Predicate>) -> Option<Predicate> {
    if members.is_empty() {
        return None;
    }

    if members.len() == 1 && kind.is_satisfied_by(1, 1) && !kind.is_satisfied_by(0, 1) {
        return members.into_iter().next();
    }

    match shape_of(&members) {
        Shape::Sync => {
            let members = all_sync(members)?;
            Some(Evaluator::from_sync(SyncGroup { kind, members }))
        }
        _ if members.len() == 2 => {
            let mut members = members.into_iter();
            let (left, right) = (members.next()?, members.next()?);
            Some(match Pair::split(left, right) {
                Pair::Sync(left, right) => Evaluator::from_sync(SyncGroup {
                    kind,
                    members: vec![left, right],
                }),
                Pair::Async(left, right) => {
                    Evaluator::from_async(AsyncPairGroup { kind, left, right })
                }
                Pair::SyncThenAsync(left, right) => {
                    Evaluator::from_async(SyncThenAsyncGroup { kind, left, right })
                }
                Pair::AsyncThenSync(left, right) => {
                    Evaluator::from_async(AsyncThenSyncGroup { kind, left, right })
                }
            })
        }
        _ => Some(Evaluator::from_async(AsyncGroup { kind, members })),
    }
}

pub fn all(members: Vec<Predicate>) -> Option<Predicate> {
    group(GroupKind::All, members)
}

pub fn any(members: Vec<Predicate>) -> Option<Predicate> {
    group(GroupKind::Any, members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MemoryMonitor;
    use crate::test_helpers::{CallCounter, constant, constant_async};
    use serde_json::json;

    fn brute_force(kind: GroupKind, outcomes: &[bool]) -> bool {
        let satisfied = outcomes.iter().filter(|outcome| **outcome).count();
        kind.is_satisfied_by(satisfied, outcomes.len())
    }

    fn kinds_for(n: usize) -> Vec<GroupKind> {
        let mut kinds = Vec::new();
        for at_least in 0..=n + 1 {
            for at_most in 0..=n + 1 {
                if at_most == 0 || at_most >= at_least {
                    kinds.push(GroupKind::from_thresholds(at_least, at_most));
                }
            }
        }
        kinds
    }

    fn outcome_sets(n: usize) -> Vec<Vec<bool>> {
        (0..1usize << n)
            .map(|bits| (0..n).map(|i| bits & (1 << i) != 0).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_group_matches_reference_for_every_subset() {
        for n in 1..=4 {
            for kind in kinds_for(n) {
                for outcomes in outcome_sets(n) {
                    let expected = brute_force(kind, &outcomes);

                    let sync_members = outcomes.iter().map(|o| constant(*o)).collect();
                    let sync_group = group(kind, sync_members).unwrap();
                    assert_eq!(
                        sync_group.evaluate(&json!(null)).await.unwrap(),
                        expected,
                        "sync {kind} over {outcomes:?}"
                    );

                    let async_members = outcomes.iter().map(|o| constant_async(*o)).collect();
                    let async_group = group(kind, async_members).unwrap();
                    assert_eq!(
                        async_group.evaluate(&json!(null)).await.unwrap(),
                        expected,
                        "async {kind} over {outcomes:?}"
                    );

                    let mixed_members = outcomes
                        .iter()
                        .enumerate()
                        .map(|(i, o)| if i % 2 == 0 { constant(*o) } else { constant_async(*o) })
                        .collect();
                    let mixed_group = group(kind, mixed_members).unwrap();
                    assert_eq!(
                        mixed_group.evaluate(&json!(null)).await.unwrap(),
                        expected,
                        "mixed {kind} over {outcomes:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_from_thresholds() {
        assert_eq!(GroupKind::from_thresholds(0, 0), GroupKind::All);
        assert_eq!(GroupKind::from_thresholds(1, 0), GroupKind::Any);
        assert_eq!(GroupKind::from_thresholds(3, 0), GroupKind::AtLeast(3));
        assert_eq!(GroupKind::from_thresholds(1, 1), GroupKind::single());
        assert_eq!(GroupKind::single().to_string(), "Single");
        assert_eq!(GroupKind::AtLeast(2).thresholds(), (2, 0));
    }

    #[test]
    fn test_normalize_thresholds_corrects_and_warns() {
        let monitor = MemoryMonitor::new();
        assert_eq!(normalize_thresholds("g", 3, 1, &monitor), (3, 3));
        assert_eq!(monitor.warnings().len(), 1);
        assert!(monitor.warnings()[0].contains("g: at_most (1)"));

        assert_eq!(normalize_thresholds("g", 2, 0, &monitor), (2, 0));
        assert_eq!(normalize_thresholds("g", 1, 4, &monitor), (1, 4));
        assert_eq!(monitor.warnings().len(), 1);
    }

    #[test]
    fn test_empty_group_is_no_constraint() {
        assert!(group(GroupKind::All, vec![]).is_none());
        assert!(group(GroupKind::Any, vec![]).is_none());
    }

    #[test]
    fn test_all_short_circuits_in_declared_order() {
        let counter = CallCounter::new();
        let members = vec![
            counter.predicate(true),
            counter.predicate(false),
            counter.predicate(true),
        ];
        let all = all(members).unwrap();
        assert!(all.is_sync());
        assert!(!all.evaluate_sync(&json!(1)).unwrap());
        assert_eq!(counter.count(), 2);
    }

    #[tokio::test]
    async fn test_at_least_stops_when_reached() {
        let counter = CallCounter::new();
        let members = vec![
            counter.predicate(true),
            counter.async_predicate(true),
            counter.predicate(true),
            counter.predicate(true),
        ];
        let at_least = group(GroupKind::AtLeast(2), members).unwrap();
        assert!(!at_least.is_sync());
        assert!(at_least.evaluate(&json!(1)).await.unwrap());
        assert_eq!(counter.count(), 2);
    }

    #[tokio::test]
    async fn test_between_stops_when_exceeded() {
        let counter = CallCounter::new();
        let members = vec![
            counter.predicate(true),
            counter.predicate(true),
            counter.predicate(true),
            counter.predicate(false),
        ];
        let single = group(GroupKind::single(), members).unwrap();
        assert!(!single.evaluate(&json!(1)).await.unwrap());
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_single_member_reduces_to_member() {
        let member = constant(true);
        let reduced = group(GroupKind::Any, vec![member]).unwrap();
        assert!(reduced.is_sync());

        // AtLeast(2) over one member is never satisfied and must stay a group.
        let never = group(GroupKind::AtLeast(2), vec![constant(true)]).unwrap();
        assert!(!never.evaluate_sync(&json!(1)).unwrap());
    }

    #[test]
    fn test_pair_strategies() {
        assert!(all(vec![constant(true), constant(true)]).unwrap().is_sync());
        assert!(!all(vec![constant(true), constant_async(true)]).unwrap().is_sync());
        assert!(!all(vec![constant_async(true), constant(true)]).unwrap().is_sync());
        assert!(
            !all(vec![constant_async(true), constant_async(true)])
                .unwrap()
                .is_sync()
        );
    }
}
