//! The serialized plan format.
//!
//! A plan is the fully resolved installation description for one recipe tree
//! on one target. Field order of every struct here is the serialized order,
//! and parameter maps are sorted, so two equal plans serialize to the same
//! bytes.
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "tool": "ripgrep",
//!   "version": "14.1.0",
//!   "platform": { "os": "linux", "arch": "amd64", "libc": "glibc" },
//!   "recipe_hash": "3f0c...",
//!   "deterministic": true,
//!   "dependencies": [],
//!   "steps": [
//!     { "action": "download_file", "params": { ... }, "evaluable": true, "deterministic": true,
//!       "url": "https://...", "checksum": "sha256:..." }
//!   ]
//! }
//! ```

use kiln_platform::Target;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::PLAN_FORMAT_VERSION;
use crate::recipe::Params;
use crate::util::hash::{ContentHash, HashError, Hashable};

#[derive(Debug, Error)]
pub enum PlanFormatError {
  #[error("failed to parse plan: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("unsupported plan format version {found} (expected {expected})")]
  UnsupportedVersion { found: u32, expected: u32 },
}

/// The resolved plan for one recipe on one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
  pub format_version: u32,
  pub tool: String,
  pub version: String,
  pub platform: Target,
  pub recipe_hash: ContentHash,
  /// False if any step in this plan or any nested plan is non-deterministic.
  pub deterministic: bool,
  /// Plans for the dependencies introduced by this recipe's selected steps.
  pub dependencies: Vec<Plan>,
  pub steps: Vec<ResolvedStep>,
}

/// One concrete operation of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStep {
  pub action: String,
  pub params: Params,
  pub evaluable: bool,
  pub deterministic: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub checksum: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub size: Option<u64>,
}

impl Plan {
  /// Pretty-printed JSON, the form golden files are stored in.
  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(self)
  }

  /// Parse a plan, rejecting any format version other than the current one.
  pub fn from_json(content: &str) -> Result<Self, PlanFormatError> {
    let plan: Plan = serde_json::from_str(content).map_err(PlanFormatError::Parse)?;
    if plan.format_version != PLAN_FORMAT_VERSION {
      return Err(PlanFormatError::UnsupportedVersion {
        found: plan.format_version,
        expected: PLAN_FORMAT_VERSION,
      });
    }
    Ok(plan)
  }

  /// Hash of the serialized plan, usable as a cache key.
  pub fn content_hash(&self) -> Result<ContentHash, HashError> {
    self.compute_hash()
  }

  /// Every step in the tree, dependencies first, depth-first.
  pub fn all_steps(&self) -> Vec<&ResolvedStep> {
    let mut steps = Vec::new();
    self.collect_steps(&mut steps);
    steps
  }

  fn collect_steps<'a>(&'a self, into: &mut Vec<&'a ResolvedStep>) {
    for dep in &self.dependencies {
      dep.collect_steps(into);
    }
    into.extend(self.steps.iter());
  }

  /// Determinism derived from the steps of the whole tree, ignoring the
  /// stored flags of nested plans.
  pub fn compute_deterministic(&self) -> bool {
    self.steps.iter().all(|s| s.deterministic) && self.dependencies.iter().all(Plan::compute_deterministic)
  }

  /// Number of plans in the tree, including this one.
  pub fn plan_count(&self) -> usize {
    1 + self.dependencies.iter().map(Plan::plan_count).sum::<usize>()
  }
}

impl Hashable for Plan {}
