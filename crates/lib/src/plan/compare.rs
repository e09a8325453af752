//! Plan comparison against a stored reference.
//!
//! Deterministic plans must match byte for byte. Non-deterministic plans are
//! compared through their [`StructuralSchema`], which keeps what is installed
//! (action kinds, package identities, versions) and drops what legitimately
//! drifts between runs (checksums, URLs, sizes, lock files).
//!
//! A change in determinism is never compared at all; it is reported as its
//! own outcome so the caller has to acknowledge it.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::types::Plan;
use crate::action::ActionRegistry;
use crate::recipe::Params;
use crate::util::hash::ContentHash;

#[derive(Debug, Error)]
pub enum CompareError {
  #[error("action '{action}' has no security-significant parameter list; it cannot be compared structurally")]
  UnclassifiedAction { action: String },

  #[error("plan determinism changed from {reference} to {candidate}")]
  DeterminismChanged { reference: bool, candidate: bool },

  #[error("plan mismatch:\n{diff}")]
  Mismatch { diff: PlanDiff },

  #[error("failed to serialize plan: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Outcome of comparing a candidate plan with a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
  Equal,
  Mismatch(PlanDiff),
  DeterminismChanged { reference: bool, candidate: bool },
}

impl Comparison {
  pub fn is_equal(&self) -> bool {
    matches!(self, Comparison::Equal)
  }

  /// `Ok` for [`Comparison::Equal`], the matching [`CompareError`] otherwise.
  pub fn into_result(self) -> Result<(), CompareError> {
    match self {
      Comparison::Equal => Ok(()),
      Comparison::Mismatch(diff) => Err(CompareError::Mismatch { diff }),
      Comparison::DeterminismChanged { reference, candidate } => {
        Err(CompareError::DeterminismChanged { reference, candidate })
      }
    }
  }
}

/// One differing value. `None` means the path is absent on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
  /// Slash-separated location, e.g. `/steps/2/params/version`.
  pub path: String,
  pub reference: Option<Value>,
  pub candidate: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanDiff {
  pub differences: Vec<Difference>,
}

impl PlanDiff {
  pub fn is_empty(&self) -> bool {
    self.differences.is_empty()
  }

  pub fn len(&self) -> usize {
    self.differences.len()
  }

  /// Whether any difference sits at or below `path`.
  pub fn touches(&self, path: &str) -> bool {
    self.differences.iter().any(|d| d.path.starts_with(path))
  }
}

impl fmt::Display for PlanDiff {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let show = |v: &Option<Value>| v.as_ref().map_or_else(|| "<absent>".to_string(), Value::to_string);
    for d in &self.differences {
      writeln!(f, "  {}: {} -> {}", d.path, show(&d.reference), show(&d.candidate))?;
    }
    Ok(())
  }
}

/// The security-significant projection of a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralSchema {
  pub format_version: u32,
  pub tool: String,
  pub version: String,
  pub recipe_hash: ContentHash,
  pub steps: Vec<SchemaStep>,
  pub dependencies: Vec<StructuralSchema>,
}

/// A step reduced to its action and allow-listed parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaStep {
  pub action: String,
  pub params: Params,
}

impl StructuralSchema {
  /// Project `plan` and its dependencies.
  ///
  /// Fails if any step's action has no allow-list in `registry`; an
  /// unclassified action never yields an empty projection.
  pub fn extract(plan: &Plan, registry: &ActionRegistry) -> Result<Self, CompareError> {
    let steps = plan
      .steps
      .iter()
      .map(|step| {
        let allowed = registry
          .get(&step.action)
          .and_then(|kind| kind.security_params())
          .ok_or_else(|| CompareError::UnclassifiedAction {
            action: step.action.clone(),
          })?;
        let params = step
          .params
          .iter()
          .filter(|(key, _)| allowed.iter().any(|a| a == *key))
          .map(|(key, value)| (key.clone(), value.clone()))
          .collect();
        Ok(SchemaStep {
          action: step.action.clone(),
          params,
        })
      })
      .collect::<Result<Vec<_>, CompareError>>()?;

    let dependencies = plan
      .dependencies
      .iter()
      .map(|dep| Self::extract(dep, registry))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      format_version: plan.format_version,
      tool: plan.tool.clone(),
      version: plan.version.clone(),
      recipe_hash: plan.recipe_hash.clone(),
      steps,
      dependencies,
    })
  }
}

/// Compare `candidate` with `reference`.
///
/// Determinism is checked first. Deterministic plans are compared on their
/// serialized bytes, non-deterministic plans on their structural schemas.
pub fn compare(reference: &Plan, candidate: &Plan, registry: &ActionRegistry) -> Result<Comparison, CompareError> {
  if reference.deterministic != candidate.deterministic {
    debug!(
      tool = %candidate.tool,
      reference = reference.deterministic,
      candidate = candidate.deterministic,
      "plan determinism changed"
    );
    return Ok(Comparison::DeterminismChanged {
      reference: reference.deterministic,
      candidate: candidate.deterministic,
    });
  }

  let (left, right) = if reference.deterministic {
    if serde_json::to_vec(reference)? == serde_json::to_vec(candidate)? {
      return Ok(Comparison::Equal);
    }
    (serde_json::to_value(reference)?, serde_json::to_value(candidate)?)
  } else {
    let left = serde_json::to_value(StructuralSchema::extract(reference, registry)?)?;
    let right = serde_json::to_value(StructuralSchema::extract(candidate, registry)?)?;
    if left == right {
      return Ok(Comparison::Equal);
    }
    (left, right)
  };

  let mut diff = PlanDiff::default();
  diff_values("", Some(&left), Some(&right), &mut diff.differences);
  if diff.is_empty() {
    // Equal values with unequal bytes: report the whole document.
    diff.differences.push(Difference {
      path: "/".to_string(),
      reference: Some(left),
      candidate: Some(right),
    });
  }

  debug!(tool = %candidate.tool, differences = diff.len(), "plan mismatch");
  Ok(Comparison::Mismatch(diff))
}

fn diff_values(path: &str, left: Option<&Value>, right: Option<&Value>, out: &mut Vec<Difference>) {
  match (left, right) {
    (Some(Value::Object(l)), Some(Value::Object(r))) => {
      let mut keys: Vec<&String> = l.keys().chain(r.keys()).collect();
      keys.sort();
      keys.dedup();
      for key in keys {
        diff_values(&format!("{}/{}", path, key), l.get(key), r.get(key), out);
      }
    }
    (Some(Value::Array(l)), Some(Value::Array(r))) => {
      for i in 0..l.len().max(r.len()) {
        diff_values(&format!("{}/{}", path, i), l.get(i), r.get(i), out);
      }
    }
    (l, r) if l == r => {}
    (l, r) => out.push(Difference {
      path: path.to_string(),
      reference: l.cloned(),
      candidate: r.cloned(),
    }),
  }
}
