//! The mixing pipeline driver.
//!
//! One run turns a seed input into terminal outputs, rejected inputs and
//! diagnostics. The loop is single-threaded per run: an item is dequeued, the
//! root mixer decides on it, the winner processes it, and every emitted
//! output is either terminal or goes back on the queue.
//!
//! The iteration bound counts dequeue operations, not distinct inputs. An
//! input that bounces through three mixers before becoming terminal uses
//! three iterations. The bound is checked after each step, and only fails
//! the run when items are still queued: a step past the bound that drains
//! the queue completes normally.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{AcceptContext, Mixer, ProcessContext, RejectReason};
use crate::config::MixingSettings;
use crate::engine::evaluator::Predicate;
use crate::engine::hooks::EvaluationHooks;
use crate::engine::value::ValueExt;
use crate::messages::MessageCollector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedInput {
    pub input: Value,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixingResult {
    pub outputs: Vec<Value>,
    pub rejected: Vec<RejectedInput>,
    /// Dequeue iterations, including the one that passed the bound.
    pub total_process_count: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for MixingResult {
    fn default() -> Self {
        Self {
            outputs: Vec::new(),
            rejected: Vec::new(),
            total_process_count: 0,
            success: true,
            error: None,
        }
    }
}

/// A root mixer together with its output test and driver policy.
///
/// The evaluators inside share one evaluation session, which every run
/// resets before it starts. Concurrent runs need a pipeline each.
#[derive(Clone)]
pub struct MixingPipeline {
    mixer: Arc<dyn Mixer>,
    output: Option<Predicate>,
    settings: MixingSettings,
    session: Option<Arc<dyn EvaluationHooks>>,
}

impl MixingPipeline {
    pub fn new(mixer: Arc<dyn Mixer>) -> Self {
        Self {
            mixer,
            output: None,
            settings: MixingSettings::default(),
            session: None,
        }
    }

    /// Sets the hooks the compiled evaluators report to.
    pub fn with_session(mut self, session: Option<Arc<dyn EvaluationHooks>>) -> Self {
        self.session = session;
        self
    }

    /// Sets the terminal-output test. Outputs failing it are mixed again.
    pub fn with_output(mut self, output: Option<Predicate>) -> Self {
        self.output = output;
        self
    }

    pub fn with_settings(mut self, settings: MixingSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn mixer(&self) -> &Arc<dyn Mixer> {
        &self.mixer
    }

    pub fn settings(&self) -> &MixingSettings {
        &self.settings
    }

    /// Runs the pipeline on `input`.
    ///
    /// `cancel` is handed to every mixer through the contexts; the loop
    /// itself does not check it.
    pub async fn mix(
        &self,
        input: Value,
        messages: Option<Arc<dyn MessageCollector>>,
        cancel: CancellationToken,
    ) -> MixingResult {
        if let Some(session) = &self.session {
            session.reset();
        }
        let max = self.settings.max_process_count.get();
        let mut run = Run {
            result: MixingResult::default(),
            messages: messages.clone(),
        };
        let mut queue = VecDeque::from([input]);
        let mut accept_ctx = AcceptContext::new(messages.clone(), cancel.clone());
        let mut process_ctx = ProcessContext::new(messages, cancel);

        while let Some(item) = queue.pop_front() {
            run.result.total_process_count += 1;
            let step = self
                .step(item, &mut run, &mut queue, &mut accept_ctx, &mut process_ctx)
                .await;
            if step.is_break() {
                break;
            }
            if run.result.total_process_count > max && !queue.is_empty() {
                run.exhausted(max, std::mem::take(&mut queue));
                break;
            }
        }

        debug!(
            outputs = run.result.outputs.len(),
            rejected = run.result.rejected.len(),
            total_process_count = run.result.total_process_count,
            success = run.result.success,
            "Mixing finished"
        );
        run.result
    }

    /// Accepts and processes one dequeued item. Breaks when the run has to
    /// stop under `fail_on_first_error`.
    async fn step(
        &self,
        item: Value,
        run: &mut Run,
        queue: &mut VecDeque<Value>,
        accept_ctx: &mut AcceptContext,
        process_ctx: &mut ProcessContext,
    ) -> ControlFlow<()> {
        accept_ctx.initialize(item);
        self.mixer.accept(accept_ctx).await;
        accept_ctx.claim(&self.mixer);

        let Some((winner, accept_info)) = accept_ctx.take_winner() else {
            if run.refused(accept_ctx) && self.settings.fail_on_first_error {
                run.stop("Stopped at the first rejected input");
                return ControlFlow::Break(());
            }
            return ControlFlow::Continue(());
        };

        trace!(mixer = %winner.name(), "Processing accepted input");
        let item = accept_ctx.input().clone();
        process_ctx.initialize(item, accept_info);
        winner.process(process_ctx).await;

        let mut failed = process_ctx.has_error();
        if failed {
            for error in process_ctx.errors() {
                warn!(mixer = %winner.name(), error = %error, "Process step flagged an error");
            }
        }

        for output in process_ctx.take_outputs() {
            match self.is_terminal(&output).await {
                Ok(true) => run.result.outputs.push(output),
                Ok(false) if self.settings.remix_output => queue.push_back(output),
                Ok(false) => run.reject(
                    output,
                    "Output is not terminal and remixing is disabled.".to_string(),
                    Some(winner.name()),
                ),
                Err(error) => {
                    failed = true;
                    run.reject(
                        output,
                        format!("Output classification failed: {error:#}"),
                        Some(winner.name()),
                    );
                }
            }
        }

        if failed && self.settings.fail_on_first_error {
            run.stop(&format!("Stopped at the first error, raised by {}", winner.name()));
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    async fn is_terminal(&self, output: &Value) -> anyhow::Result<bool> {
        match &self.output {
            Some(output_test) => output_test.evaluate(output).await,
            None => Ok(true),
        }
    }
}

/// Bookkeeping for one run.
struct Run {
    result: MixingResult,
    messages: Option<Arc<dyn MessageCollector>>,
}

impl Run {
    fn reject(&mut self, input: Value, reason: String, mixer: Option<&str>) {
        if let Some(messages) = &self.messages {
            messages.error(&format!("Rejected {}: {reason}", input.short_display()));
        }
        self.result.rejected.push(RejectedInput {
            input,
            reason,
            mixer: mixer.map(str::to_string),
        });
    }

    /// Records an input that was not accepted. Returns whether it counts as a
    /// rejection; ignored inputs do not.
    fn refused(&mut self, ctx: &AcceptContext) -> bool {
        let input = ctx.input().clone();
        match ctx.rejection() {
            Some(rejection) if rejection.reason == RejectReason::IgnoreInput => {
                trace!(mixer = %rejection.culprit, "Input ignored");
                false
            }
            Some(rejection) => {
                let reason = if rejection.detail.is_empty() {
                    format!("Rejected by {} ({})", rejection.culprit, rejection.reason)
                } else {
                    rejection.detail.clone()
                };
                let culprit = rejection.culprit.clone();
                self.reject(input, reason, Some(&culprit));
                true
            }
            None => {
                self.reject(input, "No mixer accepted the input.".to_string(), None);
                true
            }
        }
    }

    /// Fails the run once the bound is passed with work left. Every item still
    /// pending is rejected with the bound as reason, and `error` lists them.
    fn exhausted(&mut self, max: usize, pending: VecDeque<Value>) {
        let reason = format!("Reached MaxProcessCount: {max}.");
        let remainder: Vec<String> = pending.iter().map(ValueExt::short_display).collect();
        warn!(max, pending = remainder.len(), "Mixing stopped at the iteration bound");

        for input in pending {
            self.reject(input, reason.clone(), None);
        }
        self.result.success = false;
        self.result.error = Some(format!(
            "error-rulemix-mix-1 {reason} Still pending: [{}]",
            remainder.join(", ")
        ));
    }

    fn stop(&mut self, reason: &str) {
        warn!(reason = %reason, "Mixing stopped");
        if let Some(messages) = &self.messages {
            messages.error(reason);
        }
        self.result.success = false;
        self.result.error = Some(format!("error-rulemix-mix-2 {reason}"));
    }
}

/// Runs `pipeline` on `input` with a fresh cancellation token when none is
/// given.
pub async fn mix(
    pipeline: &MixingPipeline,
    input: Value,
    messages: Option<Arc<dyn MessageCollector>>,
    cancel: Option<CancellationToken>,
) -> MixingResult {
    pipeline
        .mix(input, messages, cancel.unwrap_or_default())
        .await
}
