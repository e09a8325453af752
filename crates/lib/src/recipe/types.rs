//! Recipe document types.
//!
//! A recipe is a TOML document describing how to install one tool:
//!
//! ```toml
//! [metadata]
//! name = "ripgrep"
//! supported = { os = ["linux", "darwin"] }
//!
//! [version]
//! fixed = "14.1.0"
//!
//! [[steps]]
//! action = "github_archive"
//! repo = "BurntSushi/ripgrep"
//! asset_pattern = "ripgrep-{version}-{arch}-unknown-linux-musl.tar.gz"
//! when = { os = "linux" }
//! ```
//!
//! Every key of a step other than the reserved ones (`action`, `when`,
//! `dependencies`, `extra_dependencies`, `note`) is an action parameter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consts::LATEST_VERSION;
use crate::predicate::Predicate;
use crate::util::hash::{ContentHash, HashError, Hashable};

/// Opaque action parameters. Keys are sorted, so serialization is stable.
pub type Params = serde_json::Map<String, Value>;

/// A parsed recipe. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
  pub metadata: Metadata,

  /// Version-source description, interpreted only by a `VersionResolver`.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub version: serde_json::Map<String, Value>,

  #[serde(default)]
  pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
  pub name: String,

  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub homepage: Option<String>,

  /// Targets the recipe can be installed on at all.
  #[serde(default, skip_serializing_if = "Predicate::is_empty")]
  pub supported: Predicate,
}

/// One step of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  /// Action kind name, looked up in the `ActionRegistry`.
  pub action: String,

  /// Platform condition. Empty means "always".
  #[serde(default, skip_serializing_if = "Predicate::is_empty")]
  pub when: Predicate,

  /// Replaces the action kind's implicit dependencies when set.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dependencies: Option<Vec<String>>,

  /// Added to the action kind's implicit dependencies.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub extra_dependencies: Vec<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,

  #[serde(flatten)]
  pub params: Params,
}

impl Step {
  /// A step with no condition, dependencies or parameters.
  pub fn new(action: impl Into<String>) -> Self {
    Self {
      action: action.into(),
      when: Predicate::default(),
      dependencies: None,
      extra_dependencies: Vec::new(),
      note: None,
      params: Params::new(),
    }
  }

  pub fn when(mut self, when: Predicate) -> Self {
    self.when = when;
    self
  }

  pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn depends_on<I, S>(mut self, deps: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.dependencies = Some(deps.into_iter().map(Into::into).collect());
    self
  }

  /// Dependencies this step introduces when selected.
  ///
  /// A step-level `dependencies` list replaces `implicit` (the action kind's
  /// defaults); otherwise `extra_dependencies` extends it.
  pub fn effective_dependencies(&self, implicit: &[String]) -> Result<Vec<DependencySpec>, DependencySpecError> {
    let declared: Vec<&String> = match &self.dependencies {
      Some(deps) => deps.iter().collect(),
      None => implicit.iter().chain(self.extra_dependencies.iter()).collect(),
    };
    declared.into_iter().map(|d| d.parse()).collect()
  }
}

impl Recipe {
  pub fn name(&self) -> &str {
    &self.metadata.name
  }

  pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  /// Full SHA-256 of the recipe's canonical serialization.
  pub fn content_hash(&self) -> Result<ContentHash, HashError> {
    self.compute_hash()
  }
}

impl Hashable for Recipe {}

/// A dependency reference, `name` or `name@version`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencySpec {
  pub name: String,
  /// `None` when no version or `latest` was requested.
  pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid dependency reference '{0}'")]
pub struct DependencySpecError(pub String);

impl FromStr for DependencySpec {
  type Err = DependencySpecError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (name, version) = match s.trim().split_once('@') {
      Some((name, version)) => (name.trim(), Some(version.trim())),
      None => (s.trim(), None),
    };
    if name.is_empty() || name.contains(char::is_whitespace) {
      return Err(DependencySpecError(s.to_string()));
    }
    let version = version
      .filter(|v| !v.is_empty() && *v != LATEST_VERSION)
      .map(str::to_string);
    Ok(Self {
      name: name.to_string(),
      version,
    })
  }
}

impl fmt::Display for DependencySpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.version {
      Some(v) => write!(f, "{}@{}", self.name, v),
      None => write!(f, "{}", self.name),
    }
  }
}
