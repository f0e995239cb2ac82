//! Per-step state for the accept/process protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Mixer;
use crate::messages::MessageCollector;

/// Why an input was not accepted.
///
/// `None` is the only value meaning "no decision yet". Every other value is a
/// decision, including a deliberate silent ignore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    #[default]
    None,
    IgnoreInput,
    InvalidInput,
    Error,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::None => write!(f, "None"),
            RejectReason::IgnoreInput => write!(f, "IgnoreInput"),
            RejectReason::InvalidInput => write!(f, "InvalidInput"),
            RejectReason::Error => write!(f, "Error"),
        }
    }
}

/// A rejection lifted out of an [`AcceptContext`], so a composite can try
/// further children and put it back if none of them accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub culprit: String,
    pub reason: RejectReason,
    pub detail: String,
}

/// Decision state for one dequeued input.
///
/// Created once per pipeline run and re-initialised for every item. Only
/// [`accept`](Self::accept) and [`reject`](Self::reject) change the decision.
pub struct AcceptContext {
    input: Value,
    accepted_by: Option<String>,
    winner: Option<Arc<dyn Mixer>>,
    accept_info: Option<Value>,
    rejection: Option<Rejection>,
    messages: Option<Arc<dyn MessageCollector>>,
    cancel: CancellationToken,
}

impl AcceptContext {
    pub fn new(messages: Option<Arc<dyn MessageCollector>>, cancel: CancellationToken) -> Self {
        Self {
            input: Value::Null,
            accepted_by: None,
            winner: None,
            accept_info: None,
            rejection: None,
            messages,
            cancel,
        }
    }

    /// Resets the decision for a new input.
    pub fn initialize(&mut self, input: Value) {
        self.input = input;
        self.accepted_by = None;
        self.winner = None;
        self.accept_info = None;
        self.rejection = None;
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Accepts the input. `info` is handed verbatim to the winner's process
    /// step.
    pub fn accept(&mut self, mixer: &str, info: Option<Value>) {
        self.accepted_by = Some(mixer.to_string());
        self.accept_info = info;
        self.rejection = None;
    }

    pub fn reject(&mut self, mixer: &str, reason: RejectReason, detail: impl Into<String>) {
        self.accepted_by = None;
        self.winner = None;
        self.accept_info = None;
        self.rejection = Some(Rejection {
            culprit: mixer.to_string(),
            reason,
            detail: detail.into(),
        });
    }

    /// Attaches the shared handle of the mixer that accepted.
    ///
    /// Mixers only see `&self`, so the first holder of an `Arc` above the
    /// accepting mixer records it. Later claims are ignored.
    pub fn claim(&mut self, mixer: &Arc<dyn Mixer>) {
        if self.is_accepted() && self.winner.is_none() {
            self.winner = Some(Arc::clone(mixer));
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_by.is_some()
    }

    pub fn is_decided(&self) -> bool {
        self.is_accepted() || self.reason() != RejectReason::None
    }

    pub fn accepted_by(&self) -> Option<&str> {
        self.accepted_by.as_deref()
    }

    pub fn winner(&self) -> Option<&Arc<dyn Mixer>> {
        self.winner.as_ref()
    }

    pub fn accept_info(&self) -> Option<&Value> {
        self.accept_info.as_ref()
    }

    pub fn reason(&self) -> RejectReason {
        self.rejection
            .as_ref()
            .map_or(RejectReason::None, |rejection| rejection.reason)
    }

    pub fn culprit(&self) -> Option<&str> {
        self.rejection
            .as_ref()
            .map(|rejection| rejection.culprit.as_str())
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }

    pub fn take_rejection(&mut self) -> Option<Rejection> {
        self.rejection.take()
    }

    /// Puts back a rejection taken earlier, unless a decision was made since.
    pub fn restore(&mut self, rejection: Rejection) {
        if !self.is_decided() {
            self.rejection = Some(rejection);
        }
    }

    pub fn messages(&self) -> Option<&Arc<dyn MessageCollector>> {
        self.messages.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn take_winner(&mut self) -> Option<(Arc<dyn Mixer>, Option<Value>)> {
        let winner = self.winner.take()?;
        Some((winner, self.accept_info.take()))
    }
}

/// State for the process step of an accepted input.
///
/// Outputs are collected in emission order and classified by the pipeline
/// once the step returns.
pub struct ProcessContext {
    input: Value,
    accept_info: Option<Value>,
    outputs: Vec<Value>,
    errors: Vec<String>,
    messages: Option<Arc<dyn MessageCollector>>,
    cancel: CancellationToken,
}

impl ProcessContext {
    pub fn new(messages: Option<Arc<dyn MessageCollector>>, cancel: CancellationToken) -> Self {
        Self {
            input: Value::Null,
            accept_info: None,
            outputs: Vec::new(),
            errors: Vec::new(),
            messages,
            cancel,
        }
    }

    pub fn initialize(&mut self, input: Value, accept_info: Option<Value>) {
        self.input = input;
        self.accept_info = accept_info;
        self.outputs.clear();
        self.errors.clear();
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn accept_info(&self) -> Option<&Value> {
        self.accept_info.as_ref()
    }

    pub fn emit(&mut self, output: Value) {
        self.outputs.push(output);
    }

    /// Flags the step as failed. Recorded and reported; whether the run stops
    /// is up to the pipeline.
    pub fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if let Some(messages) = &self.messages {
            messages.error(&message);
        }
        self.errors.push(message);
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn messages(&self) -> Option<&Arc<dyn MessageCollector>> {
        self.messages.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn take_outputs(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageLog;
    use serde_json::json;

    #[test]
    fn test_accept_context_lifecycle() {
        let mut ctx = AcceptContext::new(None, CancellationToken::new());
        ctx.initialize(json!(1));
        assert!(!ctx.is_decided());
        assert_eq!(ctx.reason(), RejectReason::None);

        ctx.reject("m1", RejectReason::InvalidInput, "no");
        assert!(ctx.is_decided());
        assert!(!ctx.is_accepted());
        assert_eq!(ctx.culprit(), Some("m1"));

        ctx.accept("m2", Some(json!(2)));
        assert!(ctx.is_accepted());
        assert_eq!(ctx.reason(), RejectReason::None);
        assert_eq!(ctx.accept_info(), Some(&json!(2)));

        ctx.initialize(json!(3));
        assert!(!ctx.is_decided());
        assert!(ctx.accept_info().is_none());
    }

    #[test]
    fn test_ignore_is_a_decision() {
        let mut ctx = AcceptContext::new(None, CancellationToken::new());
        ctx.initialize(json!("x"));
        ctx.reject("ignore", RejectReason::IgnoreInput, "");
        assert!(ctx.is_decided());
        assert!(!ctx.is_accepted());
    }

    #[test]
    fn test_take_and_restore_rejection() {
        let mut ctx = AcceptContext::new(None, CancellationToken::new());
        ctx.initialize(json!(1));
        ctx.reject("first", RejectReason::InvalidInput, "first says no");
        let taken = ctx.take_rejection().unwrap();
        assert!(!ctx.is_decided());

        ctx.restore(taken.clone());
        assert_eq!(ctx.rejection(), Some(&taken));

        ctx.accept("second", None);
        ctx.restore(taken);
        assert!(ctx.is_accepted());
    }

    #[test]
    fn test_process_context_errors_reach_messages() {
        let log = Arc::new(MessageLog::new());
        let mut ctx = ProcessContext::new(Some(log.clone()), CancellationToken::new());
        ctx.initialize(json!(1), None);
        ctx.emit(json!(2));
        ctx.set_error("step failed");

        assert!(ctx.has_error());
        assert_eq!(log.errors(), vec!["step failed".to_string()]);
        assert_eq!(ctx.take_outputs(), vec![json!(2)]);

        ctx.initialize(json!(5), Some(json!(6)));
        assert!(!ctx.has_error());
        assert_eq!(ctx.accept_info(), Some(&json!(6)));
    }
}
