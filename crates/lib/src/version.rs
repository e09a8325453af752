//! Version resolution boundary.
//!
//! Where a tool's versions come from (GitHub releases, package registries,
//! ...) is outside this crate. The planner asks a [`VersionResolver`] and
//! falls back to [`VersionInfo::dev`] when it fails.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::consts::{DEV_VERSION, LATEST_VERSION};
use crate::recipe::Recipe;

#[derive(Debug, Error)]
pub enum VersionError {
  #[error("recipe '{tool}' declares no usable version source")]
  NoSource { tool: String },

  #[error("version lookup for '{tool}' failed: {message}")]
  Unavailable { tool: String, message: String },
}

/// A resolved version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
  /// Plain version, e.g. `14.1.0`.
  pub version: String,
  /// Upstream tag, e.g. `v14.1.0`.
  pub tag: String,
  /// Whether resolving again is guaranteed to yield the same answer.
  pub deterministic: bool,
}

impl VersionInfo {
  pub fn new(version: impl Into<String>, tag: impl Into<String>) -> Self {
    Self {
      version: version.into(),
      tag: tag.into(),
      deterministic: true,
    }
  }

  /// Placeholder used when no version could be resolved. Never deterministic.
  pub fn dev() -> Self {
    Self {
      version: DEV_VERSION.to_string(),
      tag: DEV_VERSION.to_string(),
      deterministic: false,
    }
  }

  pub fn is_dev(&self) -> bool {
    self.version == DEV_VERSION
  }
}

/// Supplies versions for recipes.
#[async_trait]
pub trait VersionResolver: Send + Sync {
  /// Resolve `recipe`'s version. `requested` is an exact version asked for by
  /// the caller, a pin, or a depending recipe.
  async fn resolve(&self, recipe: &Recipe, requested: Option<&str>) -> Result<VersionInfo, VersionError>;
}

/// Resolves versions without I/O, from the recipe's `[version]` table:
///
/// ```toml
/// [version]
/// fixed = "14.1.0"
/// tag_prefix = "v"   # default
/// ```
///
/// Explicitly requested versions are taken as-is. Per-tool entries added with
/// [`with_version`](Self::with_version) take precedence over the recipe.
#[derive(Debug, Clone, Default)]
pub struct StaticVersionResolver {
  versions: HashMap<String, String>,
}

impl StaticVersionResolver {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_version(mut self, tool: impl Into<String>, version: impl Into<String>) -> Self {
    self.versions.insert(tool.into(), version.into());
    self
  }
}

#[async_trait]
impl VersionResolver for StaticVersionResolver {
  async fn resolve(&self, recipe: &Recipe, requested: Option<&str>) -> Result<VersionInfo, VersionError> {
    let prefix = recipe.version.get("tag_prefix").and_then(Value::as_str).unwrap_or("v");

    let version = requested
      .filter(|v| !v.is_empty() && *v != LATEST_VERSION)
      .map(str::to_string)
      .or_else(|| self.versions.get(recipe.name()).cloned())
      .or_else(|| recipe.version.get("fixed").and_then(Value::as_str).map(str::to_string))
      .ok_or_else(|| VersionError::NoSource {
        tool: recipe.name().to_string(),
      })?;

    let version = version.strip_prefix(prefix).unwrap_or(&version).to_string();
    let tag = format!("{}{}", prefix, version);
    Ok(VersionInfo::new(version, tag))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn recipe(version_table: &str) -> Recipe {
    Recipe::from_toml(&format!("[metadata]\nname = \"tool\"\n\n[version]\n{}\n", version_table)).unwrap()
  }

  #[tokio::test]
  async fn fixed_version_with_default_prefix() {
    let info = StaticVersionResolver::new()
      .resolve(&recipe("fixed = \"1.2.3\""), None)
      .await
      .unwrap();
    assert_eq!(info, VersionInfo::new("1.2.3", "v1.2.3"));
    assert!(info.deterministic);
  }

  #[tokio::test]
  async fn requested_version_wins() {
    let resolver = StaticVersionResolver::new().with_version("tool", "2.0.0");
    let info = resolver.resolve(&recipe("fixed = \"1.2.3\""), Some("v3.0.0")).await.unwrap();
    assert_eq!(info.version, "3.0.0");
    assert_eq!(info.tag, "v3.0.0");

    let info = resolver.resolve(&recipe("fixed = \"1.2.3\""), Some("latest")).await.unwrap();
    assert_eq!(info.version, "2.0.0");
  }

  #[tokio::test]
  async fn custom_tag_prefix() {
    let info = StaticVersionResolver::new()
      .resolve(&recipe("fixed = \"1.2.3\"\ntag_prefix = \"release-\""), None)
      .await
      .unwrap();
    assert_eq!(info.tag, "release-1.2.3");
  }

  #[tokio::test]
  async fn missing_source_is_an_error() {
    let err = StaticVersionResolver::new()
      .resolve(&recipe("source = \"github\""), None)
      .await
      .unwrap_err();
    assert!(matches!(err, VersionError::NoSource { ref tool } if tool == "tool"));
  }

  #[test]
  fn dev_is_never_deterministic() {
    assert!(!VersionInfo::dev().deterministic);
    assert!(VersionInfo::dev().is_dev());
  }
}
