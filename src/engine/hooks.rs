//! Tracing and error-capture hooks around evaluation.
//!
//! A [`Descriptor`] pairs a compiled evaluator with the node it came from and
//! a shared [`EvaluationHooks`] implementation. Evaluating through a
//! descriptor is observably the same as evaluating the inner evaluator,
//! except for what the hooks log and for the value substituted when a hook
//! swallows an error.
//!
//! The three extension points:
//!
//! - `on_before` may return an outcome, which aborts evaluation and is
//!   returned as is.
//! - `on_error` either substitutes an outcome (swallowing the error) or hands
//!   the error back to be re-raised.
//! - `on_after` sees the final outcome. Returning a different outcome from it
//!   is legal but discouraged: nothing upstream expects it.
//!
//! Once an error has been swallowed the evaluation session is poisoned: every
//! later `on_before` returns the family's substitute outcome, so the failure
//! short-circuits the rest of the tree without a second error.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{Level, debug, warn};

use super::evaluator::{AsyncEvaluator, Evaluator, SyncEvaluator};
use super::node::Family;
use super::value::ValueExt;
use crate::errors::EngineError;
use crate::messages::MessageCollector;
use crate::monitor::Monitor;

/// Type-erased result of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Predicate(bool),
    Transform(Value),
    Processor(Option<Value>),
}

impl Outcome {
    pub fn family(&self) -> Family {
        match self {
            Outcome::Predicate(_) => Family::Predicate,
            Outcome::Transform(_) => Family::Transform,
            Outcome::Processor(_) => Family::Processor,
        }
    }

    /// Outcome used in place of a failed or skipped evaluation.
    ///
    /// A predicate is unsatisfied, a transform leaves its input unchanged and
    /// a processor rejects.
    pub fn substitute(family: Family, input: &Value) -> Option<Outcome> {
        match family {
            Family::Predicate => Some(Outcome::Predicate(false)),
            Family::Transform => Some(Outcome::Transform(input.clone())),
            Family::Processor => Some(Outcome::Processor(None)),
            Family::Mixer | Family::Pipeline => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Predicate(value) => write!(f, "{value}"),
            Outcome::Transform(value) => write!(f, "{}", value.short_display()),
            Outcome::Processor(Some(value)) => write!(f, "{}", value.short_display()),
            Outcome::Processor(None) => write!(f, "rejected"),
        }
    }
}

/// Evaluator output types that can pass through the hook layer.
pub trait Traceable: Sized + Send + 'static {
    const FAMILY: Family;

    fn into_outcome(self) -> Outcome;

    fn from_outcome(outcome: Outcome) -> Result<Self, EngineError>;
}

fn mismatch(expected: Family, actual: &Outcome) -> EngineError {
    EngineError::OutcomeMismatch {
        expected: expected.name(),
        actual: actual.family().name(),
    }
}

impl Traceable for bool {
    const FAMILY: Family = Family::Predicate;

    fn into_outcome(self) -> Outcome {
        Outcome::Predicate(self)
    }

    fn from_outcome(outcome: Outcome) -> Result<Self, EngineError> {
        match outcome {
            Outcome::Predicate(value) => Ok(value),
            other => Err(mismatch(Self::FAMILY, &other)),
        }
    }
}

impl Traceable for Value {
    const FAMILY: Family = Family::Transform;

    fn into_outcome(self) -> Outcome {
        Outcome::Transform(self)
    }

    fn from_outcome(outcome: Outcome) -> Result<Self, EngineError> {
        match outcome {
            Outcome::Transform(value) => Ok(value),
            other => Err(mismatch(Self::FAMILY, &other)),
        }
    }
}

impl Traceable for Option<Value> {
    const FAMILY: Family = Family::Processor;

    fn into_outcome(self) -> Outcome {
        Outcome::Processor(self)
    }

    fn from_outcome(outcome: Outcome) -> Result<Self, EngineError> {
        match outcome {
            Outcome::Processor(value) => Ok(value),
            other => Err(mismatch(Self::FAMILY, &other)),
        }
    }
}

/// The node an evaluation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub path: String,
    pub family: Family,
}

impl Source {
    pub fn new(path: &str, family: Family) -> Self {
        Self {
            path: path.to_string(),
            family,
        }
    }
}

pub trait EvaluationHooks: Send + Sync {
    fn on_before(&self, _source: &Source, _input: &Value) -> Option<Outcome> {
        None
    }

    /// `Ok` swallows `error` and substitutes the outcome; `Err` re-raises.
    fn on_error(&self, _source: &Source, _input: &Value, error: anyhow::Error) -> Result<Outcome> {
        Err(error)
    }

    fn on_after(&self, _source: &Source, _input: &Value, outcome: Outcome) -> Outcome {
        outcome
    }

    fn has_error(&self) -> bool {
        false
    }

    /// Starts a new evaluation session, forgetting captured errors.
    fn reset(&self) {}
}

/// Evaluator wrapped with hooks.
pub struct Descriptor<E: ?Sized> {
    source: Source,
    inner: Arc<E>,
    hooks: Arc<dyn EvaluationHooks>,
}

impl<E: ?Sized> Descriptor<E> {
    fn before<O: Traceable>(&self, input: &Value) -> Option<Result<O>> {
        self.hooks
            .on_before(&self.source, input)
            .map(|outcome| O::from_outcome(outcome).map_err(Into::into))
    }

    fn finish<O: Traceable>(&self, input: &Value, result: Result<O>) -> Result<O> {
        let outcome = match result {
            Ok(value) => value.into_outcome(),
            Err(error) => self.hooks.on_error(&self.source, input, error)?,
        };
        let outcome = self.hooks.on_after(&self.source, input, outcome);
        Ok(O::from_outcome(outcome)?)
    }
}

impl<O: Traceable> SyncEvaluator<O> for Descriptor<dyn SyncEvaluator<O>> {
    fn evaluate(&self, input: &Value) -> Result<O> {
        if let Some(short_circuit) = self.before(input) {
            return short_circuit;
        }
        let result = self.inner.evaluate(input);
        self.finish(input, result)
    }
}

#[async_trait]
impl<O: Traceable> AsyncEvaluator<O> for Descriptor<dyn AsyncEvaluator<O>> {
    async fn evaluate(&self, input: &Value) -> Result<O> {
        if let Some(short_circuit) = self.before(input) {
            return short_circuit;
        }
        let result = self.inner.evaluate(input).await;
        self.finish(input, result)
    }
}

/// Wraps `evaluator` in a descriptor. The execution strategy is preserved.
pub fn describe<O: Traceable>(
    source: Source,
    evaluator: Evaluator<O>,
    hooks: Arc<dyn EvaluationHooks>,
) -> Evaluator<O> {
    match evaluator {
        Evaluator::Sync(inner) => Evaluator::Sync(Arc::new(Descriptor {
            source,
            inner,
            hooks,
        })),
        Evaluator::Async(inner) => Evaluator::Async(Arc::new(Descriptor {
            source,
            inner,
            hooks,
        })),
    }
}

/// An error recorded by an evaluation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedError {
    pub path: String,
    pub message: String,
}

/// Whether `error` was already captured by an inner descriptor.
pub fn is_captured(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<EngineError>(),
        Some(EngineError::EvaluationFailed { .. })
    )
}

/// Session-scoped error capture.
///
/// Each error is recorded once, by the innermost descriptor that sees it, and
/// re-raised tagged with that descriptor's path. With `swallow` set the error
/// is replaced by the family substitute instead and the session is poisoned
/// until [`EvaluationContext::clear`].
#[derive(Debug, Default)]
pub struct EvaluationContext {
    errors: Mutex<Vec<CapturedError>>,
    swallow: bool,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swallowing() -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
            swallow: true,
        }
    }

    pub fn errors(&self) -> Vec<CapturedError> {
        self.errors.lock().clone()
    }

    pub fn clear(&self) {
        self.errors.lock().clear();
    }

    /// Records `error` and decides between substitution and re-raising.
    ///
    /// Returns the recorded entry alongside, `None` when the error had been
    /// captured already.
    fn capture(
        &self,
        source: &Source,
        input: &Value,
        error: anyhow::Error,
    ) -> (Option<CapturedError>, Result<Outcome>) {
        if is_captured(&error) {
            return (None, Err(error));
        }

        let captured = CapturedError {
            path: source.path.clone(),
            message: format!("{error:#}"),
        };
        self.errors.lock().push(captured.clone());

        let result = match Outcome::substitute(source.family, input) {
            Some(substitute) if self.swallow => Ok(substitute),
            _ => {
                let details = captured.message.clone();
                Err(error.context(EngineError::EvaluationFailed {
                    path: source.path.clone(),
                    details,
                }))
            }
        };
        (Some(captured), result)
    }
}

impl EvaluationHooks for EvaluationContext {
    fn on_before(&self, source: &Source, input: &Value) -> Option<Outcome> {
        if self.has_error() {
            return Outcome::substitute(source.family, input);
        }
        None
    }

    fn on_error(&self, source: &Source, input: &Value, error: anyhow::Error) -> Result<Outcome> {
        self.capture(source, input, error).1
    }

    fn has_error(&self) -> bool {
        self.swallow && !self.errors.lock().is_empty()
    }

    fn reset(&self) {
        self.clear();
    }
}

/// Evaluation context that also reports to a monitor.
///
/// With tracing enabled every evaluated node opens a monitor group that is
/// closed with its outcome. Captured errors always go to the monitor and, when
/// present, to the message collector.
pub struct MonitoringContext {
    context: EvaluationContext,
    monitor: Arc<dyn Monitor>,
    messages: Option<Arc<dyn MessageCollector>>,
    trace: bool,
}

impl MonitoringContext {
    pub fn new(monitor: Arc<dyn Monitor>) -> Self {
        Self {
            context: EvaluationContext::new(),
            monitor,
            messages: None,
            trace: false,
        }
    }

    pub fn with_messages(mut self, messages: Arc<dyn MessageCollector>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_swallow(mut self, swallow: bool) -> Self {
        self.context.swallow = swallow;
        self
    }

    pub fn errors(&self) -> Vec<CapturedError> {
        self.context.errors()
    }

    pub fn clear(&self) {
        self.context.clear();
    }

    fn group_name(source: &Source) -> String {
        format!("{} {}", source.family, source.path)
    }
}

impl EvaluationHooks for MonitoringContext {
    fn on_before(&self, source: &Source, input: &Value) -> Option<Outcome> {
        if let Some(substitute) = self.context.on_before(source, input) {
            debug!(path = %source.path, "Skipping evaluation after captured error");
            return Some(substitute);
        }
        if self.trace {
            self.monitor
                .open_group(Level::DEBUG, &Self::group_name(source));
        }
        None
    }

    fn on_error(&self, source: &Source, input: &Value, error: anyhow::Error) -> Result<Outcome> {
        let (captured, result) = self.context.capture(source, input, error);
        if let Some(captured) = captured {
            warn!(path = %captured.path, error = %captured.message, "Evaluation failed");
            self.monitor.error(&format!("{}: {}", captured.path, captured.message));
            if let Some(messages) = &self.messages {
                messages.error(&format!(
                    "Evaluation of {} failed: {}",
                    captured.path, captured.message
                ));
            }
        }
        // A re-raised error skips on_after, so its group closes here.
        if self.trace && result.is_err() {
            self.monitor
                .close_group(Level::DEBUG, &Self::group_name(source), "error");
        }
        result
    }

    fn on_after(&self, source: &Source, _input: &Value, outcome: Outcome) -> Outcome {
        if self.trace {
            self.monitor
                .close_group(Level::DEBUG, &Self::group_name(source), &outcome.to_string());
        }
        outcome
    }

    fn has_error(&self) -> bool {
        self.context.has_error()
    }

    fn reset(&self) {
        self.context.clear();
    }
}
