//! Recursive expansion of composite actions.

use std::collections::HashSet;

use tracing::trace;

use super::types::{ActionContext, ActionError, ActionRegistry, DecomposedStep};
use crate::consts::MAX_DECOMPOSE_DEPTH;
use crate::recipe::Params;
use crate::util::hash::{ContentHash, hash_bytes};

/// Expand `action` with `params` until only primitives remain.
///
/// A primitive expands to itself. Composites may expand into further
/// composites; expansion fails if the same (action, params) pair reappears on
/// the current expansion path, or if nesting exceeds [`MAX_DECOMPOSE_DEPTH`].
/// Output order follows the decomposers' output order, depth first.
pub fn decompose_to_primitives(
  registry: &ActionRegistry,
  action: &str,
  params: &Params,
  ctx: &ActionContext<'_>,
) -> Result<Vec<DecomposedStep>, ActionError> {
  let mut out = Vec::new();
  let mut path = HashSet::new();
  expand(registry, DecomposedStep::new(action, params.clone()), ctx, &mut path, 0, &mut out)?;
  Ok(out)
}

fn expand(
  registry: &ActionRegistry,
  step: DecomposedStep,
  ctx: &ActionContext<'_>,
  path: &mut HashSet<ContentHash>,
  depth: usize,
  out: &mut Vec<DecomposedStep>,
) -> Result<(), ActionError> {
  let kind = registry.kind(&step.action)?;
  let Some(decomposer) = kind.decomposer() else {
    out.push(step);
    return Ok(());
  };

  if depth >= MAX_DECOMPOSE_DEPTH {
    return Err(ActionError::DecompositionTooDeep {
      action: step.action,
      max: MAX_DECOMPOSE_DEPTH,
    });
  }

  let key = step_key(&step);
  if !path.insert(key.clone()) {
    return Err(ActionError::DecompositionCycle { action: step.action });
  }

  let children = decomposer.decompose(&step.params, ctx)?;
  trace!(action = %step.action, children = children.len(), "decomposed step");

  for mut child in children {
    // A child fetching the composite's own URL inherits its checksum.
    if child.checksum.is_none() && children_share_artifact(&step, &child) {
      child.checksum = step.checksum.clone();
      child.size = child.size.or(step.size);
    }
    expand(registry, child, ctx, path, depth + 1, out)?;
  }

  path.remove(&key);
  Ok(())
}

fn children_share_artifact(parent: &DecomposedStep, child: &DecomposedStep) -> bool {
  parent.checksum.is_some() && child.params.get("url").is_some() && child.params.get("url") == parent.params.get("url")
}

fn step_key(step: &DecomposedStep) -> ContentHash {
  let params = serde_json::Value::Object(step.params.clone());
  hash_bytes(format!("{}\0{}", step.action, params).as_bytes())
}
