//! Compiles sealed configuration nodes into evaluators and mixers.
//!
//! The [`Compiler`] is the build context. It is passed explicitly wherever a
//! node has to be compiled, including when a placeholder is substituted
//! later, so there is no global builder state.
//!
//! "Nothing" is a normal compile result: an empty group places no
//! constraint, an empty sequence is the identity, a void decision passes
//! everything through and a placeholder compiles to nothing until it is
//! replaced. These are reported through the monitor, never as errors.

use std::sync::Arc;
use tracing::debug;

use super::evaluator::{Evaluator, Predicate, Processor, Transform, non_null};
use super::hooks::{EvaluationHooks, MonitoringContext, Source, Traceable, describe};
use super::node::{Family, Node, NodeSpec};
use super::predicate_group::{GroupKind, group, normalize_thresholds};
use super::processor_node::decision;
use super::transform_sequence::sequence;
use crate::config::Config;
use crate::errors::BuildError;
use crate::mixer::{CompositeMixer, IgnoreMixer, Mixer, MixingPipeline, ProcessorMixer};
use crate::monitor::Monitor;

/// Creates the hooks of one evaluation session.
pub type SessionHooks = Arc<dyn Fn() -> Arc<dyn EvaluationHooks> + Send + Sync>;

#[derive(Clone)]
pub struct Compiler {
    monitor: Arc<dyn Monitor>,
    hooks: Option<Arc<dyn EvaluationHooks>>,
    sessions: Option<SessionHooks>,
}

impl Compiler {
    pub fn new(monitor: Arc<dyn Monitor>) -> Self {
        Self {
            monitor,
            hooks: None,
            sessions: None,
        }
    }

    /// Builds a compiler whose hooks follow the evaluation flags of `config`.
    ///
    /// Every compile gets its own [`MonitoringContext`], so an error swallowed
    /// in one pipeline never poisons another.
    pub fn from_config(config: &Config, monitor: Arc<dyn Monitor>) -> Self {
        let compiler = Self::new(monitor.clone());
        if !config.trace_evaluation && !config.swallow_errors {
            return compiler;
        }
        let (trace, swallow) = (config.trace_evaluation, config.swallow_errors);
        compiler.with_session_hooks(Arc::new(move || {
            Arc::new(
                MonitoringContext::new(monitor.clone())
                    .with_trace(trace)
                    .with_swallow(swallow),
            ) as Arc<dyn EvaluationHooks>
        }))
    }

    /// Wraps every compiled predicate, transform and processor in a
    /// descriptor reporting to `hooks`. Every compile shares the same hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn EvaluationHooks>) -> Self {
        self.hooks = Some(hooks);
        self.sessions = None;
        self
    }

    /// Like [`Compiler::with_hooks`], with fresh hooks from `sessions` for
    /// every top-level compile.
    pub fn with_session_hooks(mut self, sessions: SessionHooks) -> Self {
        self.hooks = None;
        self.sessions = Some(sessions);
        self
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    /// A compiler bound to the hooks of one session.
    fn session(&self) -> Compiler {
        match &self.sessions {
            Some(sessions) => Compiler {
                monitor: Arc::clone(&self.monitor),
                hooks: Some(sessions()),
                sessions: None,
            },
            None => self.clone(),
        }
    }

    pub fn compile_predicate(&self, node: &Node) -> Result<Option<Predicate>, BuildError> {
        self.session().build_predicate(node)
    }

    pub fn compile_transform(&self, node: &Node) -> Result<Option<Transform>, BuildError> {
        self.session().build_transform(node)
    }

    pub fn compile_processor(&self, node: &Node) -> Result<Option<Processor>, BuildError> {
        self.session().build_processor(node)
    }

    pub fn compile_mixer(&self, node: &Node) -> Result<Option<Arc<dyn Mixer>>, BuildError> {
        self.session().build_mixer(node)
    }

    /// Compiles a pipeline bound to one evaluation session. Each run of the
    /// pipeline resets the session before it starts.
    pub fn compile_pipeline(&self, node: &Node) -> Result<MixingPipeline, BuildError> {
        self.session().build_pipeline(node)
    }

    fn build_predicate(&self, node: &Node) -> Result<Option<Predicate>, BuildError> {
        let predicate = match node.spec() {
            NodeSpec::Predicate(predicate) => Some(predicate.clone()),
            NodeSpec::Group {
                at_least,
                at_most,
                children,
            } => {
                let (at_least, at_most) =
                    normalize_thresholds(node.path(), *at_least, *at_most, self.monitor.as_ref());
                let kind = GroupKind::from_thresholds(at_least, at_most);
                let mut members = Vec::with_capacity(children.len());
                for child in children {
                    match self.build_predicate(child)? {
                        Some(member) => members.push(member),
                        None => self.void(child, "skipped group member"),
                    }
                }
                let compiled = group(kind, members);
                if compiled.is_none() {
                    self.void(node, &format!("empty {kind} group places no constraint"));
                }
                compiled
            }
            NodeSpec::Placeholder { .. } => self.placeholder(node, Family::Predicate)?,
            _ => return Err(wrong_family(node, Family::Predicate)),
        };
        Ok(self.describe(node, predicate))
    }

    fn build_transform(&self, node: &Node) -> Result<Option<Transform>, BuildError> {
        let transform = match node.spec() {
            NodeSpec::Transform(transform) => Some(non_null(node.path(), transform.clone())),
            NodeSpec::Sequence { steps } => {
                let mut compiled = Vec::with_capacity(steps.len());
                for step in steps {
                    match self.build_transform(step)? {
                        Some(step) => compiled.push(step),
                        None => self.void(step, "identity step dropped"),
                    }
                }
                let chain = sequence(compiled);
                if chain.is_none() {
                    self.void(node, "empty sequence is the identity");
                }
                chain
            }
            NodeSpec::Placeholder { .. } => self.placeholder(node, Family::Transform)?,
            _ => return Err(wrong_family(node, Family::Transform)),
        };
        Ok(self.describe(node, transform))
    }

    fn build_processor(&self, node: &Node) -> Result<Option<Processor>, BuildError> {
        let processor = match node.spec() {
            NodeSpec::Processor(processor) => Some(processor.clone()),
            NodeSpec::Decision {
                condition,
                processors,
                transform,
            } => {
                let condition = match condition {
                    Some(condition) => self.build_predicate(condition)?,
                    None => None,
                };
                let processors = processors
                    .iter()
                    .map(|processor| self.build_processor(processor))
                    .collect::<Result<Vec<_>, _>>()?;
                let transform = match transform {
                    Some(transform) => self.build_transform(transform)?,
                    None => None,
                };
                let compiled = decision(node.path(), condition, processors, transform);
                if compiled.is_none() {
                    self.void(node, "void processor passes every input through");
                }
                compiled
            }
            NodeSpec::Placeholder { .. } => self.placeholder(node, Family::Processor)?,
            _ => return Err(wrong_family(node, Family::Processor)),
        };
        Ok(self.describe(node, processor))
    }

    fn build_mixer(&self, node: &Node) -> Result<Option<Arc<dyn Mixer>>, BuildError> {
        let mixer: Arc<dyn Mixer> = match node.spec() {
            NodeSpec::ProcessorMixer { accept, processor } => {
                let accept = match accept {
                    Some(accept) => self.build_predicate(accept)?,
                    None => None,
                };
                let processor = match processor {
                    Some(processor) => self.build_processor(processor)?,
                    None => None,
                };
                Arc::new(ProcessorMixer::new(node.path(), accept, processor))
            }
            NodeSpec::IgnoreMixer { condition } => {
                let condition = match condition {
                    Some(condition) => self.build_predicate(condition)?,
                    None => None,
                };
                Arc::new(IgnoreMixer::new(node.path(), condition))
            }
            NodeSpec::CompositeMixer { children } => {
                let mut mixers = Vec::with_capacity(children.len());
                for child in children {
                    match self.build_mixer(child)? {
                        Some(mixer) => mixers.push(mixer),
                        None => self.void(child, "skipped composite child"),
                    }
                }
                if mixers.is_empty() {
                    self.monitor
                        .warn(&format!("{}: composite mixer has no children", node.path()));
                    return Ok(None);
                }
                Arc::new(CompositeMixer::new(node.path(), mixers))
            }
            NodeSpec::Mixer(custom) => Arc::clone(&custom.0),
            NodeSpec::Placeholder { .. } => return self.placeholder(node, Family::Mixer),
            _ => return Err(wrong_family(node, Family::Mixer)),
        };
        Ok(Some(mixer))
    }

    fn build_pipeline(&self, node: &Node) -> Result<MixingPipeline, BuildError> {
        let NodeSpec::Pipeline {
            mixer,
            output,
            settings,
        } = node.spec()
        else {
            return Err(wrong_family(node, Family::Pipeline));
        };
        // Deserialized settings bypass the MaxProcessCount constructor.
        if settings.max_process_count.get() == 0 {
            return Err(BuildError::InvalidSettings {
                path: node.path().to_string(),
                details: "max_process_count must be greater than 0".to_string(),
            });
        }

        let root = self
            .compile_mixer(mixer)?
            .ok_or_else(|| BuildError::EmptyMixer {
                path: mixer.path().to_string(),
            })?;
        let output = match output {
            Some(output) => self.build_predicate(output)?,
            None => None,
        };
        Ok(MixingPipeline::new(root)
            .with_output(output)
            .with_settings(settings.clone())
            .with_session(self.hooks.clone()))
    }

    /// Compiles `node` by its family and discards the result.
    pub fn check(&self, node: &Node) -> Result<(), BuildError> {
        match node.family() {
            Family::Predicate => self.compile_predicate(node).map(drop),
            Family::Transform => self.compile_transform(node).map(drop),
            Family::Processor => self.compile_processor(node).map(drop),
            Family::Mixer => self.compile_mixer(node).map(drop),
            Family::Pipeline => self.compile_pipeline(node).map(drop),
        }
    }

    fn describe<O: Traceable>(
        &self,
        node: &Node,
        evaluator: Option<Evaluator<O>>,
    ) -> Option<Evaluator<O>> {
        let evaluator = evaluator?;
        Some(match &self.hooks {
            Some(hooks) => describe(
                Source::new(node.path(), O::FAMILY),
                evaluator,
                Arc::clone(hooks),
            ),
            None => evaluator,
        })
    }

    fn placeholder<T>(&self, node: &Node, expected: Family) -> Result<Option<T>, BuildError> {
        if node.family() != expected {
            return Err(wrong_family(node, expected));
        }
        self.void(node, "placeholder compiles to nothing");
        Ok(None)
    }

    fn void(&self, node: &Node, what: &str) {
        debug!(path = %node.path(), kind = node.spec().kind_name(), "{what}");
        self.monitor.trace(&format!("{}: {what}", node.path()));
    }
}

fn wrong_family(node: &Node, expected: Family) -> BuildError {
    BuildError::WrongFamily {
        path: node.path().to_string(),
        expected: expected.name(),
        actual: node.family().name(),
    }
}

/// Compiles a predicate node with a default compiler reporting to `monitor`.
pub fn compile_predicate(
    node: &Node,
    monitor: Arc<dyn Monitor>,
) -> Result<Option<Predicate>, BuildError> {
    Compiler::new(monitor).compile_predicate(node)
}

pub fn compile_transform(
    node: &Node,
    monitor: Arc<dyn Monitor>,
) -> Result<Option<Transform>, BuildError> {
    Compiler::new(monitor).compile_transform(node)
}

pub fn compile_processor(
    node: &Node,
    monitor: Arc<dyn Monitor>,
) -> Result<Option<Processor>, BuildError> {
    Compiler::new(monitor).compile_processor(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MixingSettings;
    use crate::engine::hooks::EvaluationContext;
    use crate::engine::node::NodeDef;
    use crate::monitor::MemoryMonitor;
    use crate::test_helpers::{add, add_async, constant, constant_async, contains};
    use serde_json::json;

    fn compiler() -> (Compiler, Arc<MemoryMonitor>) {
        let monitor = Arc::new(MemoryMonitor::new());
        (Compiler::new(monitor.clone()), monitor)
    }

    #[tokio::test]
    async fn test_compile_nested_groups() {
        let (compiler, _) = compiler();
        let root = Node::seal(
            "root",
            NodeDef::all(vec![
                NodeDef::any(vec![
                    NodeDef::predicate(contains("A")),
                    NodeDef::predicate(contains("B")),
                ]),
                NodeDef::at_least(
                    2,
                    vec![
                        NodeDef::predicate(contains("x")),
                        NodeDef::predicate(contains("y")),
                        NodeDef::predicate(contains("z")),
                    ],
                ),
            ]),
        );
        let predicate = compiler.compile_predicate(&root).unwrap().unwrap();
        assert!(predicate.is_sync());
        assert!(predicate.evaluate(&json!("Axy")).await.unwrap());
        assert!(!predicate.evaluate(&json!("Ax")).await.unwrap());
    }

    #[test]
    fn test_thresholds_corrected_at_build() {
        let (compiler, monitor) = compiler();
        let root = Node::seal(
            "root",
            NodeDef::group(
                2,
                1,
                vec![
                    NodeDef::predicate(constant(true)),
                    NodeDef::predicate(constant(true)),
                    NodeDef::predicate(constant(true)),
                ],
            ),
        );
        let predicate = compiler.compile_predicate(&root).unwrap().unwrap();
        assert_eq!(monitor.warnings().len(), 1);
        // Corrected to Between(2, 2): three satisfied members exceed it.
        assert!(!predicate.evaluate_sync(&json!(1)).unwrap());
    }

    #[test]
    fn test_empty_and_placeholder_compile_to_nothing() {
        let (compiler, monitor) = compiler();
        let empty = Node::seal("root", NodeDef::any(vec![]));
        assert!(compiler.compile_predicate(&empty).unwrap().is_none());

        let placeholder = Node::seal("root", NodeDef::placeholder(Family::Transform));
        assert!(compiler.compile_transform(&placeholder).unwrap().is_none());
        assert!(monitor.errors().is_empty());

        let error = compiler.compile_predicate(&placeholder).unwrap_err();
        assert!(matches!(error, BuildError::WrongFamily { .. }));
    }

    #[test]
    fn test_wrong_family_child_is_a_build_error() {
        let (compiler, _) = compiler();
        let root = Node::seal("root", NodeDef::all(vec![NodeDef::transform(add(1.0))]));
        let error = compiler.compile_predicate(&root).unwrap_err();
        assert_eq!(
            error.to_string(),
            "error-rulemix-build-1 Node root/children/0 is a transform node, expected predicate"
        );
    }

    #[tokio::test]
    async fn test_compile_decision_and_sequence() {
        let (compiler, _) = compiler();
        let root = Node::seal(
            "root",
            NodeDef::decision(
                Some(NodeDef::predicate(constant_async(true))),
                vec![],
                Some(NodeDef::sequence(vec![
                    NodeDef::transform(add(1.0)),
                    NodeDef::placeholder(Family::Transform),
                    NodeDef::transform(add_async(10.0)),
                ])),
            ),
        );
        let processor = compiler.compile_processor(&root).unwrap().unwrap();
        assert!(!processor.is_sync());
        assert_eq!(
            processor.evaluate(&json!(1.0)).await.unwrap(),
            Some(json!(12.0))
        );
    }

    #[tokio::test]
    async fn test_null_transform_leaf_fails_with_path() {
        let (compiler, _) = compiler();
        let root = Node::seal(
            "root",
            NodeDef::sequence(vec![
                NodeDef::transform(add(1.0)),
                NodeDef::transform(Transform::sync_fn(|_| Ok(serde_json::Value::Null))),
            ]),
        );
        let transform = compiler.compile_transform(&root).unwrap().unwrap();
        let error = transform.evaluate(&json!(1.0)).await.unwrap_err();
        assert!(error.to_string().contains("root/steps/1"));
    }

    #[tokio::test]
    async fn test_hooks_wrap_every_node() {
        let context = Arc::new(EvaluationContext::new());
        let (compiler, _) = compiler();
        let compiler = compiler.with_hooks(context.clone());
        let root = Node::seal(
            "root",
            NodeDef::all(vec![
                NodeDef::predicate(constant(true)),
                NodeDef::predicate(Predicate::sync_fn(|_| Err(anyhow::anyhow!("boom")))),
            ]),
        );
        let predicate = compiler.compile_predicate(&root).unwrap().unwrap();
        assert!(predicate.evaluate(&json!(1)).await.is_err());

        let errors = context.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "root/children/1");
    }

    #[tokio::test]
    async fn test_compile_pipeline() {
        let (compiler, _) = compiler();
        let root = Node::seal(
            "root",
            NodeDef::pipeline(
                NodeDef::composite_mixer(vec![
                    NodeDef::placeholder(Family::Mixer),
                    NodeDef::processor_mixer(None, Some(NodeDef::rewrite(NodeDef::transform(add(1.0))))),
                ]),
                None,
                MixingSettings::default(),
            ),
        );
        let pipeline = compiler.compile_pipeline(&root).unwrap();
        let result = pipeline
            .mix(json!(1.0), None, tokio_util::sync::CancellationToken::new())
            .await;
        assert_eq!(result.outputs, vec![json!(2.0)]);

        let empty = Node::seal(
            "root",
            NodeDef::pipeline(NodeDef::composite_mixer(vec![]), None, MixingSettings::default()),
        );
        assert!(matches!(
            compiler.compile_pipeline(&empty),
            Err(BuildError::EmptyMixer { .. })
        ));
    }

    #[test]
    fn test_zero_bound_is_invalid_settings() {
        let (compiler, _) = compiler();
        let settings: MixingSettings = serde_json::from_value(json!({
            "max_process_count": 0,
            "fail_on_first_error": false,
            "remix_output": true
        }))
        .unwrap();
        let root = Node::seal(
            "root",
            NodeDef::pipeline(NodeDef::processor_mixer(None, None), None, settings),
        );
        let error = compiler.compile_pipeline(&root).err().expect("expected a build error");
        assert!(error.to_string().starts_with("error-rulemix-build-3"));
    }
}
