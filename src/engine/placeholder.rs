//! Path-scoped node substitution.
//!
//! A placeholder compiles to nothing until a fragment is substituted at its
//! path. Substitution works on any node, not only placeholders: the fragment
//! must belong to the same family, and the resulting tree must compile with
//! the given [`Compiler`]. Nothing outside the path to the target is rebuilt.

use std::sync::Arc;
use tracing::debug;

use super::compiler::Compiler;
use super::node::{Node, NodeDef};
use crate::errors::ReconfigureError;

/// Substitutes `fragment` at `path` under `root`.
///
/// Returns `Ok(None)` when `path` is not in the tree, so the caller keeps
/// `root` as is, and an error when the fragment does not fit or the updated
/// tree fails to build.
pub fn try_set_placeholder(
    root: &Arc<Node>,
    path: &str,
    fragment: &NodeDef,
    compiler: &Compiler,
) -> Result<Option<Arc<Node>>, ReconfigureError> {
    let Some(target) = root.find(path) else {
        debug!(path = %path, "Substitution target not found");
        return Ok(None);
    };

    if fragment.family() != target.family() {
        return Err(ReconfigureError::FamilyMismatch {
            path: path.to_string(),
            expected: target.family().name(),
            actual: fragment.family().name(),
        });
    }

    let Some(updated) = Node::replace_at(root, path, fragment) else {
        return Ok(None);
    };
    // The whole tree has to build: a void fragment can empty its ancestors.
    compiler
        .check(&updated)
        .map_err(|source| ReconfigureError::BuildFailed {
            path: path.to_string(),
            source,
        })?;
    Ok(Some(updated))
}

/// Applies every substitution against `root`, all or nothing.
///
/// A missing path fails the whole batch with
/// [`ReconfigureError::PathNotFound`].
pub fn try_set_placeholders(
    root: &Arc<Node>,
    fragments: &[(String, NodeDef)],
    compiler: &Compiler,
) -> Result<Arc<Node>, ReconfigureError> {
    let mut updated = Arc::clone(root);
    for (path, fragment) in fragments {
        updated = try_set_placeholder(&updated, path, fragment, compiler)?.ok_or_else(|| {
            ReconfigureError::PathNotFound {
                path: path.to_string(),
            }
        })?;
    }
    Ok(updated)
}
