//! Composition engine: evaluators, combinators, the configuration tree and
//! its compiler.
//!
//! Dependency order, leaves first: [`evaluator`] and [`hybrid`], then the
//! combinators ([`predicate_group`], [`transform_sequence`],
//! [`processor_node`]), then [`hooks`], and finally [`node`], [`compiler`]
//! and [`placeholder`] which assemble everything from configuration.

pub mod compiler;
pub mod evaluator;
pub mod hooks;
pub mod hybrid;
pub mod node;
pub mod placeholder;
pub mod predicate_group;
pub mod processor_node;
pub mod registry;
pub mod transform_sequence;
pub mod value;

pub use compiler::{Compiler, SessionHooks, compile_predicate, compile_processor, compile_transform};
pub use evaluator::{AsyncEvaluator, Evaluator, Predicate, Processor, SyncEvaluator, Transform};
pub use node::{Family, Node, NodeDef, NodeSpec};
pub use placeholder::{try_set_placeholder, try_set_placeholders};
