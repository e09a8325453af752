//! Static recipe checks that do not depend on a target.

use std::fmt;

use super::types::Recipe;
use crate::action::ActionRegistry;

/// A problem found in a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
  /// Index of the offending step, `None` for recipe-level problems.
  pub step: Option<usize>,
  pub message: String,
}

impl fmt::Display for ValidationIssue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.step {
      Some(step) => write!(f, "step {}: {}", step, self.message),
      None => write!(f, "{}", self.message),
    }
  }
}

/// Check `recipe` against `registry`, returning every problem found.
///
/// An empty result means the recipe can be planned for some target; it says
/// nothing about whether any particular target is supported.
pub fn validate_recipe(recipe: &Recipe, registry: &ActionRegistry) -> Vec<ValidationIssue> {
  let mut issues = Vec::new();
  let recipe_issue = |message: String| ValidationIssue { step: None, message };

  if recipe.name().trim().is_empty() {
    issues.push(recipe_issue("metadata.name is empty".to_string()));
  }
  if recipe.steps.is_empty() {
    issues.push(recipe_issue("recipe has no steps".to_string()));
  }
  if let Err(e) = recipe.metadata.supported.validate() {
    issues.push(recipe_issue(format!("metadata.supported: {}", e)));
  }

  for (index, step) in recipe.steps.iter().enumerate() {
    let mut push = |message: String| {
      issues.push(ValidationIssue {
        step: Some(index),
        message,
      })
    };

    let kind = registry.get(&step.action);
    if kind.is_none() {
      push(format!("unknown action '{}'", step.action));
    }
    if let Err(e) = step.when.validate() {
      push(format!("when: {}", e));
    }

    let implicit = kind.map(|k| k.dependencies()).unwrap_or_default();
    match step.effective_dependencies(implicit) {
      Ok(deps) => {
        if deps.iter().any(|d| d.name == recipe.name()) {
          push(format!("'{}' depends on itself", recipe.name()));
        }
      }
      Err(e) => push(e.to_string()),
    }
  }

  issues
}
