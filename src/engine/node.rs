//! Configuration node tree.
//!
//! Nodes are pure data: compiling a node never mutates it. The tree comes in
//! two forms sharing one shape, [`NodeSpec`]:
//!
//! - [`NodeDef`] is the authoring form. It has no paths and is what callers
//!   (or an external name-based resolver) build.
//! - [`Node`] is the sealed form. Every node carries its positional path,
//!   such as `root/mixer/children/1/processor/condition`, and children are
//!   shared through `Arc` so a substitution only rebuilds the nodes on the
//!   path to the changed child.
//!
//! Leaves hold already compiled evaluators; resolving a leaf by kind name is
//! the job of [`EvaluatorRegistry`](super::registry::EvaluatorRegistry).

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use super::evaluator::{Predicate, Processor, Transform};
use crate::config::MixingSettings;
use crate::mixer::Mixer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Predicate,
    Transform,
    Processor,
    Mixer,
    Pipeline,
}

impl Family {
    pub fn name(&self) -> &'static str {
        match self {
            Family::Predicate => "predicate",
            Family::Transform => "transform",
            Family::Processor => "processor",
            Family::Mixer => "mixer",
            Family::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A programmatic mixer placed directly in the tree.
#[derive(Clone)]
pub struct CustomMixer(pub Arc<dyn Mixer>);

impl fmt::Debug for CustomMixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomMixer({})", self.0.name())
    }
}

/// One node, generic over how children are held.
#[derive(Debug, Clone)]
pub enum NodeSpec<C> {
    /// Pre-resolved predicate leaf.
    Predicate(Predicate),
    /// Threshold group; `0` means unbounded on that side.
    Group {
        at_least: usize,
        at_most: usize,
        children: Vec<C>,
    },
    /// Pre-resolved transform leaf.
    Transform(Transform),
    Sequence {
        steps: Vec<C>,
    },
    /// Pre-resolved processor leaf.
    Processor(Processor),
    Decision {
        condition: Option<C>,
        processors: Vec<C>,
        transform: Option<C>,
    },
    ProcessorMixer {
        accept: Option<C>,
        processor: Option<C>,
    },
    IgnoreMixer {
        condition: Option<C>,
    },
    CompositeMixer {
        children: Vec<C>,
    },
    Mixer(CustomMixer),
    Pipeline {
        mixer: C,
        /// Terminal-output test. Without one every output is terminal.
        output: Option<C>,
        settings: MixingSettings,
    },
    /// Compiles to nothing until substituted by path.
    Placeholder {
        family: Family,
    },
}

impl<C> NodeSpec<C> {
    pub fn family(&self) -> Family {
        match self {
            NodeSpec::Predicate(_) | NodeSpec::Group { .. } => Family::Predicate,
            NodeSpec::Transform(_) | NodeSpec::Sequence { .. } => Family::Transform,
            NodeSpec::Processor(_) | NodeSpec::Decision { .. } => Family::Processor,
            NodeSpec::ProcessorMixer { .. }
            | NodeSpec::IgnoreMixer { .. }
            | NodeSpec::CompositeMixer { .. }
            | NodeSpec::Mixer(_) => Family::Mixer,
            NodeSpec::Pipeline { .. } => Family::Pipeline,
            NodeSpec::Placeholder { family } => *family,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeSpec::Predicate(_) => "predicate",
            NodeSpec::Group { .. } => "group",
            NodeSpec::Transform(_) => "transform",
            NodeSpec::Sequence { .. } => "sequence",
            NodeSpec::Processor(_) => "processor",
            NodeSpec::Decision { .. } => "decision",
            NodeSpec::ProcessorMixer { .. } => "processor_mixer",
            NodeSpec::IgnoreMixer { .. } => "ignore_mixer",
            NodeSpec::CompositeMixer { .. } => "composite_mixer",
            NodeSpec::Mixer(_) => "custom_mixer",
            NodeSpec::Pipeline { .. } => "pipeline",
            NodeSpec::Placeholder { .. } => "placeholder",
        }
    }

    /// Children in declared order, each with its path segment.
    pub fn children(&self) -> Vec<(String, &C)> {
        let mut children = Vec::new();
        match self {
            NodeSpec::Group { children: list, .. } | NodeSpec::CompositeMixer { children: list } => {
                indexed(&mut children, "children", list)
            }
            NodeSpec::Sequence { steps } => indexed(&mut children, "steps", steps),
            NodeSpec::Decision {
                condition,
                processors,
                transform,
            } => {
                named(&mut children, "condition", condition.as_ref());
                indexed(&mut children, "processors", processors);
                named(&mut children, "transform", transform.as_ref());
            }
            NodeSpec::ProcessorMixer { accept, processor } => {
                named(&mut children, "accept", accept.as_ref());
                named(&mut children, "processor", processor.as_ref());
            }
            NodeSpec::IgnoreMixer { condition } => {
                named(&mut children, "condition", condition.as_ref())
            }
            NodeSpec::Pipeline { mixer, output, .. } => {
                named(&mut children, "mixer", Some(mixer));
                named(&mut children, "output", output.as_ref());
            }
            NodeSpec::Predicate(_)
            | NodeSpec::Transform(_)
            | NodeSpec::Processor(_)
            | NodeSpec::Mixer(_)
            | NodeSpec::Placeholder { .. } => {}
        }
        children
    }

    /// Rebuilds the node with every child passed through `f`, in declared
    /// order. `f` receives the child's path segment.
    pub fn try_map<D, E>(
        self,
        mut f: impl FnMut(String, C) -> Result<D, E>,
    ) -> Result<NodeSpec<D>, E> {
        Ok(match self {
            NodeSpec::Predicate(predicate) => NodeSpec::Predicate(predicate),
            NodeSpec::Group {
                at_least,
                at_most,
                children,
            } => NodeSpec::Group {
                at_least,
                at_most,
                children: map_list("children", children, &mut f)?,
            },
            NodeSpec::Transform(transform) => NodeSpec::Transform(transform),
            NodeSpec::Sequence { steps } => NodeSpec::Sequence {
                steps: map_list("steps", steps, &mut f)?,
            },
            NodeSpec::Processor(processor) => NodeSpec::Processor(processor),
            NodeSpec::Decision {
                condition,
                processors,
                transform,
            } => {
                let condition = condition
                    .map(|child| f("condition".to_string(), child))
                    .transpose()?;
                let processors = map_list("processors", processors, &mut f)?;
                let transform = transform
                    .map(|child| f("transform".to_string(), child))
                    .transpose()?;
                NodeSpec::Decision {
                    condition,
                    processors,
                    transform,
                }
            }
            NodeSpec::ProcessorMixer { accept, processor } => {
                let accept = accept
                    .map(|child| f("accept".to_string(), child))
                    .transpose()?;
                let processor = processor
                    .map(|child| f("processor".to_string(), child))
                    .transpose()?;
                NodeSpec::ProcessorMixer { accept, processor }
            }
            NodeSpec::IgnoreMixer { condition } => NodeSpec::IgnoreMixer {
                condition: condition
                    .map(|child| f("condition".to_string(), child))
                    .transpose()?,
            },
            NodeSpec::CompositeMixer { children } => NodeSpec::CompositeMixer {
                children: map_list("children", children, &mut f)?,
            },
            NodeSpec::Mixer(mixer) => NodeSpec::Mixer(mixer),
            NodeSpec::Pipeline {
                mixer,
                output,
                settings,
            } => {
                let mixer = f("mixer".to_string(), mixer)?;
                let output = output
                    .map(|child| f("output".to_string(), child))
                    .transpose()?;
                NodeSpec::Pipeline {
                    mixer,
                    output,
                    settings,
                }
            }
            NodeSpec::Placeholder { family } => NodeSpec::Placeholder { family },
        })
    }

    pub fn map<D>(self, mut f: impl FnMut(String, C) -> D) -> NodeSpec<D> {
        match self.try_map(|segment, child| Ok::<D, Infallible>(f(segment, child))) {
            Ok(spec) => spec,
            Err(never) => match never {},
        }
    }
}

fn map_list<C, D, E>(
    segment: &str,
    list: Vec<C>,
    f: &mut impl FnMut(String, C) -> Result<D, E>,
) -> Result<Vec<D>, E> {
    list.into_iter()
        .enumerate()
        .map(|(index, child)| f(format!("{segment}/{index}"), child))
        .collect()
}

fn indexed<'a, C>(out: &mut Vec<(String, &'a C)>, segment: &str, list: &'a [C]) {
    out.extend(
        list.iter()
            .enumerate()
            .map(|(index, child)| (format!("{segment}/{index}"), child)),
    );
}

fn named<'a, C>(out: &mut Vec<(String, &'a C)>, segment: &str, child: Option<&'a C>) {
    if let Some(child) = child {
        out.push((segment.to_string(), child));
    }
}

/// Authoring form of a configuration node.
#[derive(Debug, Clone)]
pub struct NodeDef(Box<NodeSpec<NodeDef>>);

impl NodeDef {
    pub fn new(spec: NodeSpec<NodeDef>) -> Self {
        Self(Box::new(spec))
    }

    pub fn spec(&self) -> &NodeSpec<NodeDef> {
        &self.0
    }

    pub fn into_spec(self) -> NodeSpec<NodeDef> {
        *self.0
    }

    pub fn family(&self) -> Family {
        self.0.family()
    }

    pub fn predicate(predicate: Predicate) -> Self {
        Self::new(NodeSpec::Predicate(predicate))
    }

    pub fn group(at_least: usize, at_most: usize, children: Vec<NodeDef>) -> Self {
        Self::new(NodeSpec::Group {
            at_least,
            at_most,
            children,
        })
    }

    pub fn all(children: Vec<NodeDef>) -> Self {
        Self::group(0, 0, children)
    }

    pub fn any(children: Vec<NodeDef>) -> Self {
        Self::group(1, 0, children)
    }

    pub fn single(children: Vec<NodeDef>) -> Self {
        Self::group(1, 1, children)
    }

    pub fn at_least(count: usize, children: Vec<NodeDef>) -> Self {
        Self::group(count, 0, children)
    }

    /// Satisfied when no more than `count` children are.
    pub fn at_most(count: usize, children: Vec<NodeDef>) -> Self {
        Self::group(0, count, children)
    }

    pub fn transform(transform: Transform) -> Self {
        Self::new(NodeSpec::Transform(transform))
    }

    pub fn sequence(steps: Vec<NodeDef>) -> Self {
        Self::new(NodeSpec::Sequence { steps })
    }

    pub fn processor(processor: Processor) -> Self {
        Self::new(NodeSpec::Processor(processor))
    }

    pub fn decision(
        condition: Option<NodeDef>,
        processors: Vec<NodeDef>,
        transform: Option<NodeDef>,
    ) -> Self {
        Self::new(NodeSpec::Decision {
            condition,
            processors,
            transform,
        })
    }

    pub fn filter(condition: NodeDef) -> Self {
        Self::decision(Some(condition), Vec::new(), None)
    }

    pub fn rewrite(transform: NodeDef) -> Self {
        Self::decision(None, Vec::new(), Some(transform))
    }

    pub fn processor_mixer(accept: Option<NodeDef>, processor: Option<NodeDef>) -> Self {
        Self::new(NodeSpec::ProcessorMixer { accept, processor })
    }

    pub fn ignore_mixer(condition: Option<NodeDef>) -> Self {
        Self::new(NodeSpec::IgnoreMixer { condition })
    }

    pub fn composite_mixer(children: Vec<NodeDef>) -> Self {
        Self::new(NodeSpec::CompositeMixer { children })
    }

    pub fn custom_mixer(mixer: Arc<dyn Mixer>) -> Self {
        Self::new(NodeSpec::Mixer(CustomMixer(mixer)))
    }

    pub fn pipeline(mixer: NodeDef, output: Option<NodeDef>, settings: MixingSettings) -> Self {
        Self::new(NodeSpec::Pipeline {
            mixer,
            output,
            settings,
        })
    }

    pub fn placeholder(family: Family) -> Self {
        Self::new(NodeSpec::Placeholder { family })
    }
}

/// Sealed configuration node.
#[derive(Debug)]
pub struct Node {
    path: String,
    spec: NodeSpec<Arc<Node>>,
}

impl Node {
    /// Seals an authoring tree, assigning positional paths under `path`.
    pub fn seal(path: &str, def: NodeDef) -> Arc<Node> {
        let spec = def
            .into_spec()
            .map(|segment, child| Node::seal(&format!("{path}/{segment}"), child));
        Arc::new(Node {
            path: path.to_string(),
            spec,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn spec(&self) -> &NodeSpec<Arc<Node>> {
        &self.spec
    }

    pub fn family(&self) -> Family {
        self.spec.family()
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.spec, NodeSpec::Placeholder { .. })
    }

    pub fn children(&self) -> Vec<&Arc<Node>> {
        self.spec
            .children()
            .into_iter()
            .map(|(_, child)| child)
            .collect()
    }

    /// Finds the node at `path` in this subtree.
    pub fn find(&self, path: &str) -> Option<&Node> {
        if self.path == path {
            return Some(self);
        }
        if !is_below(&self.path, path) {
            return None;
        }
        self.children()
            .into_iter()
            .find_map(|child| child.find(path))
    }

    /// Placeholders in this subtree, in declared order.
    pub fn placeholders(&self) -> Vec<&Node> {
        let mut found = Vec::new();
        self.collect_placeholders(&mut found);
        found
    }

    fn collect_placeholders<'a>(&'a self, found: &mut Vec<&'a Node>) {
        if self.is_placeholder() {
            found.push(self);
        }
        for child in self.children() {
            child.collect_placeholders(found);
        }
    }

    /// Returns a tree where the node at `path` is replaced by `replacement`,
    /// or `None` when `path` is not in this subtree.
    ///
    /// Only the ancestors of the replaced node are rebuilt; every other
    /// subtree is the same `Arc` as in `root`.
    pub fn replace_at(root: &Arc<Node>, path: &str, replacement: &NodeDef) -> Option<Arc<Node>> {
        if root.path == path {
            return Some(Node::seal(path, replacement.clone()));
        }
        if !is_below(&root.path, path) {
            return None;
        }

        let mut replaced = false;
        let spec = root.spec.clone().map(|_, child| {
            if replaced {
                return child;
            }
            match Node::replace_at(&child, path, replacement) {
                Some(new_child) => {
                    replaced = true;
                    new_child
                }
                None => child,
            }
        });

        replaced.then(|| {
            Arc::new(Node {
                path: root.path.clone(),
                spec,
            })
        })
    }
}

fn is_below(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}
