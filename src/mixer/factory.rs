//! Mixer factory with hot reconfiguration.
//!
//! The factory keeps the tree it was created with (`initial`) and the tree
//! currently in force (`current`). Reconfiguration only ever moves `current`,
//! through a compare-and-retry loop on a single atomic slot: read the
//! current tree, compute the substituted tree from it, swap it in only if
//! nobody else changed `current` meanwhile. Readers always see a complete
//! tree.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pipeline::{MixingPipeline, MixingResult};
use crate::config::ReconfigureRetries;
use crate::engine::compiler::Compiler;
use crate::engine::node::{Family, Node, NodeDef};
use crate::engine::placeholder::{try_set_placeholder, try_set_placeholders};
use crate::errors::{BuildError, ReconfigureError};
use crate::messages::MessageCollector;

pub struct MixerFactory {
    initial: Arc<Node>,
    current: ArcSwap<Node>,
    compiler: Compiler,
    retries: ReconfigureRetries,
}

impl MixerFactory {
    /// Seals `root` as a pipeline tree rooted at path `root` and checks that
    /// it builds.
    pub fn new(root: NodeDef, compiler: Compiler) -> Result<Self, BuildError> {
        Self::from_node(Node::seal("root", root), compiler)
    }

    pub fn from_node(root: Arc<Node>, compiler: Compiler) -> Result<Self, BuildError> {
        if root.family() != Family::Pipeline {
            return Err(BuildError::WrongFamily {
                path: root.path().to_string(),
                expected: Family::Pipeline.name(),
                actual: root.family().name(),
            });
        }
        compiler.compile_pipeline(&root)?;
        Ok(Self {
            current: ArcSwap::new(Arc::clone(&root)),
            initial: root,
            compiler,
            retries: ReconfigureRetries::default(),
        })
    }

    pub fn with_retries(mut self, retries: ReconfigureRetries) -> Self {
        self.retries = retries;
        self
    }

    pub fn initial(&self) -> &Arc<Node> {
        &self.initial
    }

    pub fn current(&self) -> Arc<Node> {
        self.current.load_full()
    }

    /// Compiles the current tree.
    pub fn build(&self) -> Result<MixingPipeline, BuildError> {
        self.compiler.compile_pipeline(&self.current())
    }

    /// Builds the current tree and runs it on `input`.
    pub async fn mix(
        &self,
        input: serde_json::Value,
        messages: Option<Arc<dyn MessageCollector>>,
        cancel: CancellationToken,
    ) -> Result<MixingResult, BuildError> {
        let pipeline = self.build()?;
        Ok(pipeline.mix(input, messages, cancel).await)
    }

    /// Substitutes `fragment` at `path` in the current tree.
    ///
    /// Returns `false`, leaving `current` untouched, when `path` does not
    /// exist.
    pub fn try_set_placeholder(
        &self,
        path: &str,
        fragment: NodeDef,
    ) -> Result<bool, ReconfigureError> {
        self.swap(|snapshot| try_set_placeholder(snapshot, path, &fragment, &self.compiler))
            .map(|swapped| {
                if swapped {
                    info!(path = %path, "Configuration node replaced");
                }
                swapped
            })
    }

    /// Applies several substitutions as one batch against one snapshot.
    pub fn try_set_placeholders(
        &self,
        fragments: Vec<(String, NodeDef)>,
    ) -> Result<(), ReconfigureError> {
        self.swap(|snapshot| {
            try_set_placeholders(snapshot, &fragments, &self.compiler).map(Some)
        })?;
        info!(count = fragments.len(), "Configuration nodes replaced");
        Ok(())
    }

    /// Puts the initial tree back in force.
    pub fn reset(&self) {
        self.current.store(Arc::clone(&self.initial));
    }

    fn swap<F>(&self, update: F) -> Result<bool, ReconfigureError>
    where
        F: Fn(&Arc<Node>) -> Result<Option<Arc<Node>>, ReconfigureError>,
    {
        let attempts = self.retries.get();
        for attempt in 1..=attempts {
            let snapshot = self.current.load_full();
            let Some(updated) = update(&snapshot)? else {
                return Ok(false);
            };
            let previous = self.current.compare_and_swap(&snapshot, updated);
            if Arc::ptr_eq(&previous, &snapshot) {
                return Ok(true);
            }
            debug!(attempt, "Configuration changed concurrently, retrying");
        }
        Err(ReconfigureError::RetriesExhausted { attempts })
    }
}
