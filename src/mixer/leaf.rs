//! Leaf mixers built from configuration.

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{AcceptContext, Mixer, ProcessContext, RejectReason};
use crate::engine::evaluator::{Predicate, Processor};

/// Accepts inputs that pass its accept predicate and its processor.
///
/// The processed value travels as accept-info and is what the process step
/// emits. Without a processor the input itself is emitted.
pub struct ProcessorMixer {
    name: String,
    accept: Option<Predicate>,
    processor: Option<Processor>,
}

impl ProcessorMixer {
    pub fn new(name: &str, accept: Option<Predicate>, processor: Option<Processor>) -> Self {
        Self {
            name: name.to_string(),
            accept,
            processor,
        }
    }
}

#[async_trait]
impl Mixer for ProcessorMixer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn accept(&self, ctx: &mut AcceptContext) {
        if let Some(accept) = &self.accept {
            let accepted = accept.evaluate(ctx.input()).await;
            match accepted {
                Ok(true) => {}
                Ok(false) => {
                    ctx.reject(
                        &self.name,
                        RejectReason::InvalidInput,
                        format!("{}: input did not match the accept condition", self.name),
                    );
                    return;
                }
                Err(error) => {
                    debug!(mixer = %self.name, error = ?error, "Accept condition failed");
                    ctx.reject(
                        &self.name,
                        RejectReason::Error,
                        format!("{}: accept condition failed: {error:#}", self.name),
                    );
                    return;
                }
            }
        }

        let Some(processor) = &self.processor else {
            let info = ctx.input().clone();
            ctx.accept(&self.name, Some(info));
            return;
        };

        let processed = processor.evaluate(ctx.input()).await;
        match processed {
            Ok(Some(value)) => ctx.accept(&self.name, Some(value)),
            Ok(None) => ctx.reject(
                &self.name,
                RejectReason::InvalidInput,
                format!("{}: processor rejected the input", self.name),
            ),
            Err(error) => {
                debug!(mixer = %self.name, error = ?error, "Processor failed");
                ctx.reject(
                    &self.name,
                    RejectReason::Error,
                    format!("{}: processor failed: {error:#}", self.name),
                );
            }
        }
    }

    async fn process(&self, ctx: &mut ProcessContext) {
        let output = ctx
            .accept_info()
            .cloned()
            .unwrap_or_else(|| ctx.input().clone());
        trace!(mixer = %self.name, "Emitting processed value");
        ctx.emit(output);
    }
}

/// Silently drops inputs matching its condition, every input when it has
/// none.
pub struct IgnoreMixer {
    name: String,
    condition: Option<Predicate>,
}

impl IgnoreMixer {
    pub fn new(name: &str, condition: Option<Predicate>) -> Self {
        Self {
            name: name.to_string(),
            condition,
        }
    }
}

#[async_trait]
impl Mixer for IgnoreMixer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn accept(&self, ctx: &mut AcceptContext) {
        let ignored = match &self.condition {
            None => Ok(true),
            Some(condition) => condition.evaluate(ctx.input()).await,
        };
        match ignored {
            Ok(true) => ctx.reject(&self.name, RejectReason::IgnoreInput, ""),
            Ok(false) => ctx.reject(
                &self.name,
                RejectReason::InvalidInput,
                format!("{}: input is not ignored", self.name),
            ),
            Err(error) => ctx.reject(
                &self.name,
                RejectReason::Error,
                format!("{}: ignore condition failed: {error:#}", self.name),
            ),
        }
    }

    async fn process(&self, ctx: &mut ProcessContext) {
        ctx.set_error(format!("{} never accepts, nothing to process", self.name));
    }
}
