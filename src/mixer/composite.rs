//! Composite mixer: visits children depth-first until one decides.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use super::{AcceptContext, Mixer, ProcessContext, RejectReason};

/// Programmatic hooks around a composite's child search.
///
/// `before` runs first; if it leaves the input undecided the children are
/// visited. `after` always runs last and may still change the decision.
#[async_trait]
pub trait AcceptHook: Send + Sync {
    async fn before(&self, _ctx: &mut AcceptContext) {}

    async fn after(&self, _ctx: &mut AcceptContext) {}
}

/// Tries children in declared order.
///
/// An `InvalidInput` rejection from a child is a soft "not mine": the next
/// child is tried, and the first such rejection is put back if no child
/// accepts. `IgnoreInput` and `Error` end the search.
pub struct CompositeMixer {
    name: String,
    children: Vec<Arc<dyn Mixer>>,
    hook: Option<Arc<dyn AcceptHook>>,
}

impl CompositeMixer {
    pub fn new(name: &str, children: Vec<Arc<dyn Mixer>>) -> Self {
        Self {
            name: name.to_string(),
            children,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn AcceptHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn children(&self) -> &[Arc<dyn Mixer>] {
        &self.children
    }
}

#[async_trait]
impl Mixer for CompositeMixer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn accept(&self, ctx: &mut AcceptContext) {
        if let Some(hook) = &self.hook {
            hook.before(ctx).await;
        }

        if !ctx.is_decided() {
            let mut first_refusal = None;
            for child in &self.children {
                child.accept(ctx).await;
                if ctx.is_accepted() {
                    ctx.claim(child);
                    break;
                }
                match ctx.reason() {
                    RejectReason::None => {}
                    RejectReason::InvalidInput => {
                        if let Some(rejection) = ctx.take_rejection() {
                            first_refusal.get_or_insert(rejection);
                        }
                    }
                    RejectReason::IgnoreInput | RejectReason::Error => break,
                }
            }
            if let Some(rejection) = first_refusal {
                ctx.restore(rejection);
            }
            if !ctx.is_decided() {
                trace!(mixer = %self.name, "No child decided");
            }
        }

        if let Some(hook) = &self.hook {
            hook.after(ctx).await;
        }
    }

    async fn process(&self, ctx: &mut ProcessContext) {
        // Winners are always children; reaching here means a hook accepted
        // on the composite's behalf.
        ctx.set_error(format!(
            "{} accepted without a child to process the input",
            self.name
        ));
    }
}
