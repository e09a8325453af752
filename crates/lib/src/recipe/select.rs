//! Step selection: which steps of a recipe apply to a target.
//!
//! A step is selected when its own `when` predicate and its action kind's
//! implicit constraint both hold for the target. Selection preserves step
//! order and is the only place predicates are evaluated against steps, so the
//! dependency resolver and the plan generator always agree on which steps
//! (and therefore which dependency edges) exist.

use std::collections::BTreeMap;

use kiln_platform::{Target, TargetField};
use thiserror::Error;
use tracing::{trace, warn};

use super::types::{DependencySpec, DependencySpecError, Recipe, Step};
use crate::action::{ActionKind, ActionRegistry};
use crate::predicate::{Constraint, Evaluation, UnknownAttributePolicy};

#[derive(Debug, Error)]
pub enum SelectError {
  #[error("recipe '{recipe}' step {step} uses unknown action '{action}'")]
  UnknownAction {
    recipe: String,
    step: usize,
    action: String,
  },

  #[error(
    "recipe '{recipe}' step {step} only matches because the target does not know: {}",
    join_fields(.fields)
  )]
  AmbiguousTarget {
    recipe: String,
    step: usize,
    fields: Vec<TargetField>,
  },

  #[error("recipe '{recipe}' step {step}: {source}")]
  Dependency {
    recipe: String,
    step: usize,
    #[source]
    source: DependencySpecError,
  },
}

fn join_fields(fields: &[TargetField]) -> String {
  fields.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
}

/// A step that applies to the target, with its resolved action kind.
#[derive(Debug, Clone, Copy)]
pub struct SelectedStep<'a> {
  /// Position of the step in the recipe.
  pub index: usize,
  pub step: &'a Step,
  pub kind: &'a ActionKind,
}

/// Select the steps of `recipe` that apply to `target`, in recipe order.
pub fn select_steps<'a>(
  recipe: &'a Recipe,
  target: &Target,
  registry: &'a ActionRegistry,
  policy: UnknownAttributePolicy,
) -> Result<Vec<SelectedStep<'a>>, SelectError> {
  let mut selected = Vec::new();

  for (index, step) in recipe.steps.iter().enumerate() {
    let kind = registry.get(&step.action).ok_or_else(|| SelectError::UnknownAction {
      recipe: recipe.name().to_string(),
      step: index,
      action: step.action.clone(),
    })?;

    let mut constraint = Constraint::from(step.when.clone());
    if let Some(implicit) = kind.constraint() {
      constraint = constraint.and(implicit.clone());
    }
    let evaluation = constraint.evaluate(target);

    let admitted = policy.admits(&evaluation).map_err(|fields| SelectError::AmbiguousTarget {
      recipe: recipe.name().to_string(),
      step: index,
      fields,
    })?;

    if let Evaluation::Assumed(fields) = &evaluation
      && admitted
    {
      warn!(
        recipe = recipe.name(),
        step = index,
        unknown = ?fields,
        "step selected only because target attributes are unknown"
      );
    }

    trace!(recipe = recipe.name(), step = index, action = %step.action, admitted, "evaluated step");
    if admitted {
      selected.push(SelectedStep { index, step, kind });
    }
  }

  Ok(selected)
}

/// Dependencies introduced by the selected steps of `recipe`, sorted by name.
///
/// When several steps name the same dependency, the first explicit version
/// request in step order is kept.
pub fn direct_dependencies(
  recipe: &Recipe,
  target: &Target,
  registry: &ActionRegistry,
  policy: UnknownAttributePolicy,
) -> Result<Vec<DependencySpec>, SelectError> {
  let mut deps: BTreeMap<String, Option<String>> = BTreeMap::new();

  for selected in select_steps(recipe, target, registry, policy)? {
    let specs = selected
      .step
      .effective_dependencies(selected.kind.dependencies())
      .map_err(|source| SelectError::Dependency {
        recipe: recipe.name().to_string(),
        step: selected.index,
        source,
      })?;
    for spec in specs {
      let entry = deps.entry(spec.name).or_default();
      if entry.is_none() {
        *entry = spec.version;
      }
    }
  }

  Ok(
    deps
      .into_iter()
      .map(|(name, version)| DependencySpec { name, version })
      .collect(),
  )
}
