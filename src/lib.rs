//! # rulemix
//!
//! rulemix is a declarative rule-composition and mixing engine. Predicates,
//! transforms and processors are assembled from a configuration tree into
//! executable evaluators, then driven through a bounded, queue-based mixing
//! pipeline that turns one seed input into terminal outputs, rejected inputs
//! and diagnostics.
//!
//! ## Architecture Overview
//!
//! ### Evaluation Engine
//! - **Evaluators** are synchronous or asynchronous callables over a JSON
//!   value; the strategy is fixed at build time
//! - **Groups** combine predicates under All / Any / AtLeast / Between
//!   thresholds, **sequences** chain transforms, **decision nodes** gate a
//!   transform behind a condition and subordinate processors
//! - Combinators stay fully synchronous when every operand is, and otherwise
//!   only await the asynchronous operands
//! - **Hooks** wrap evaluation for tracing and error capture
//!
//! ### Mixing
//! - **Mixers** accept or reject an input, then process accepted inputs into
//!   outputs; composite mixers search their children depth-first
//! - The **pipeline** re-queues non-terminal outputs until they become
//!   terminal or the iteration bound is hit
//! - The **factory** swaps parts of a running configuration atomically
//!
//! ## Configuration
//!
//! Defaults are read from the environment, see [`config::Config`]:
//! - `RULEMIX_MAX_PROCESS_COUNT`: Default iteration bound per run
//! - `RULEMIX_FAIL_ON_FIRST_ERROR`: Stop runs at the first rejection or error
//! - `RULEMIX_REMIX_OUTPUT`: Re-queue non-terminal outputs
//! - `RULEMIX_TRACE_EVALUATION` / `RULEMIX_SWALLOW_ERRORS`: Evaluation hooks
//! - `RULEMIX_RECONFIGURE_RETRIES`: Compare-and-retry budget
//!
//! ## Error Handling
//!
//! All error strings use the format: `error-rulemix-<domain>-<number> <message>: <details>`
//!
//! ## Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use rulemix::config::MixingSettings;
//! use rulemix::engine::{Compiler, NodeDef, Predicate, Transform};
//! use rulemix::mixer::MixerFactory;
//! use rulemix::monitor::TracingMonitor;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let negate = Transform::sync_fn(|v| Ok(json!(-v.as_f64().unwrap_or_default())));
//! let large = Predicate::sync_fn(|v| Ok(v.as_f64().unwrap_or_default() > 10.0));
//!
//! let factory = MixerFactory::new(
//!     NodeDef::pipeline(
//!         NodeDef::processor_mixer(None, Some(NodeDef::rewrite(NodeDef::transform(negate)))),
//!         Some(NodeDef::predicate(large)),
//!         MixingSettings::default().with_max_process_count(4),
//!     ),
//!     Compiler::new(Arc::new(TracingMonitor::new())),
//! )?;
//!
//! let result = factory.mix(json!(42.0), None, Default::default()).await?;
//! assert_eq!(result.outputs, vec![json!(42.0)]);
//! assert_eq!(result.total_process_count, 2);
//! # Ok(())
//! # }
//! ```

/// Configuration management.
///
/// Environment-driven defaults with validated newtypes, and the per-pipeline
/// [`MixingSettings`](config::MixingSettings).
pub mod config;

/// Composition engine: evaluators, combinators, configuration nodes and the
/// compiler that turns one into the other.
pub mod engine;

pub mod errors;

/// User-facing message collection.
pub mod messages;

/// Accept/process mixers, the mixing pipeline and hot reconfiguration.
pub mod mixer;

/// Operator-facing monitor abstraction and its `tracing` implementation.
pub mod monitor;

#[cfg(test)]
pub mod test_helpers;
