//! Versions carried over from a previously generated plan.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::Plan;
use crate::consts::DEV_VERSION;

/// Tool name to exact version.
///
/// A pinned version is handed to the version resolver as the requested
/// version, so regenerating from a pin set asks for exactly the versions of
/// the plan it was taken from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSet {
  versions: BTreeMap<String, String>,
}

impl PinSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Collect the version of every plan in the tree. `dev` placeholders are
  /// not pins and are skipped.
  pub fn from_plan(plan: &Plan) -> Self {
    let mut pins = Self::new();
    pins.collect(plan);
    pins
  }

  fn collect(&mut self, plan: &Plan) {
    if plan.version != DEV_VERSION {
      self
        .versions
        .entry(plan.tool.clone())
        .or_insert_with(|| plan.version.clone());
    }
    for dep in &plan.dependencies {
      self.collect(dep);
    }
  }

  pub fn get(&self, tool: &str) -> Option<&str> {
    self.versions.get(tool).map(String::as_str)
  }

  pub fn insert(&mut self, tool: impl Into<String>, version: impl Into<String>) -> &mut Self {
    self.versions.insert(tool.into(), version.into());
    self
  }

  pub fn len(&self) -> usize {
    self.versions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.versions.is_empty()
  }
}
