//! Accept/process mixers and the pipeline that drives them.
//!
//! One mix step moves an input from undecided to either accepted (with a
//! winner and its accept-info) or rejected (with a culprit and a
//! [`RejectReason`]). The pipeline only ever calls `process` on the winner.

use async_trait::async_trait;

pub mod composite;
pub mod context;
pub mod factory;
pub mod leaf;
pub mod pipeline;

pub use composite::{AcceptHook, CompositeMixer};
pub use context::{AcceptContext, ProcessContext, RejectReason, Rejection};
pub use factory::MixerFactory;
pub use leaf::{IgnoreMixer, ProcessorMixer};
pub use pipeline::{MixingPipeline, MixingResult, RejectedInput, mix};

#[async_trait]
pub trait Mixer: Send + Sync {
    fn name(&self) -> &str;

    /// Decides on `ctx.input()`.
    ///
    /// A leaf mixer must call exactly one of [`AcceptContext::accept`] and
    /// [`AcceptContext::reject`] before returning.
    async fn accept(&self, ctx: &mut AcceptContext);

    /// Processes an input this mixer accepted, emitting zero or more outputs.
    async fn process(&self, ctx: &mut ProcessContext);
}
