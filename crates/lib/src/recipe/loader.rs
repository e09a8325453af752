//! The recipe loader boundary.
//!
//! The planner only sees [`RecipeLoader`]: a function from name to parsed
//! recipe. Where documents come from and how they are cached is up to the
//! implementation. All loaders here are safe to share between tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::types::Recipe;
use crate::consts::RECIPE_EXTENSION;

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("recipe '{name}' not found")]
  NotFound { name: String },

  #[error("invalid recipe name '{name}'")]
  InvalidName { name: String },

  #[error("failed to read recipe '{name}' from {path}: {source}")]
  Io {
    name: String,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse recipe '{name}': {source}")]
  Parse {
    name: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("recipe file for '{name}' declares name '{declared}'")]
  NameMismatch { name: String, declared: String },
}

/// Supplies parsed recipes by name.
///
/// Implementations must be safe for concurrent calls. Loaders do not retry;
/// a transient failure is returned to the caller.
#[async_trait]
pub trait RecipeLoader: Send + Sync {
  async fn load(&self, name: &str) -> Result<Arc<Recipe>, LoadError>;
}

#[async_trait]
impl<L: RecipeLoader + ?Sized> RecipeLoader for Arc<L> {
  async fn load(&self, name: &str) -> Result<Arc<Recipe>, LoadError> {
    (**self).load(name).await
  }
}

/// Recipes held in memory, keyed by their declared name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
  recipes: HashMap<String, Arc<Recipe>>,
}

impl MemoryLoader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, recipe: Recipe) -> &mut Self {
    self.recipes.insert(recipe.name().to_string(), Arc::new(recipe));
    self
  }

  pub fn with(mut self, recipe: Recipe) -> Self {
    self.insert(recipe);
    self
  }

  /// Parse and add a TOML document.
  pub fn insert_toml(&mut self, content: &str) -> Result<&mut Self, toml::de::Error> {
    let recipe = Recipe::from_toml(content)?;
    Ok(self.insert(recipe))
  }
}

#[async_trait]
impl RecipeLoader for MemoryLoader {
  async fn load(&self, name: &str) -> Result<Arc<Recipe>, LoadError> {
    self.recipes.get(name).cloned().ok_or_else(|| LoadError::NotFound {
      name: name.to_string(),
    })
  }
}

/// Recipes stored as `<name>.toml` files.
///
/// Both a flat layout (`<root>/<name>.toml`) and a registry layout sharded by
/// first letter (`<root>/<letter>/<name>.toml`) are searched, in that order.
#[derive(Debug, Clone)]
pub struct DirLoader {
  root: PathBuf,
}

impl DirLoader {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn candidates(&self, name: &str) -> Vec<PathBuf> {
    let file = format!("{}.{}", name, RECIPE_EXTENSION);
    let mut paths = vec![self.root.join(&file)];
    if let Some(first) = name.chars().next() {
      paths.push(self.root.join(first.to_ascii_lowercase().to_string()).join(&file));
    }
    paths
  }
}

fn valid_name(name: &str) -> bool {
  !name.is_empty()
    && !name.starts_with('.')
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
}

#[async_trait]
impl RecipeLoader for DirLoader {
  async fn load(&self, name: &str) -> Result<Arc<Recipe>, LoadError> {
    if !valid_name(name) {
      return Err(LoadError::InvalidName { name: name.to_string() });
    }

    for path in self.candidates(name) {
      let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
          trace!(path = %path.display(), "no recipe file");
          continue;
        }
        Err(source) => {
          return Err(LoadError::Io {
            name: name.to_string(),
            path,
            source,
          });
        }
      };

      let recipe = Recipe::from_toml(&content).map_err(|source| LoadError::Parse {
        name: name.to_string(),
        source,
      })?;
      if recipe.name() != name {
        return Err(LoadError::NameMismatch {
          name: name.to_string(),
          declared: recipe.name().to_string(),
        });
      }
      debug!(recipe = name, path = %path.display(), "loaded recipe");
      return Ok(Arc::new(recipe));
    }

    Err(LoadError::NotFound { name: name.to_string() })
  }
}

/// Caches another loader's successful results.
///
/// Reads proceed concurrently. Two tasks missing the same name may both load
/// it; the later insert wins, which is harmless because a recipe's content is
/// stable for its name. Failures are not cached.
#[derive(Debug)]
pub struct CachedLoader<L> {
  inner: L,
  cache: RwLock<HashMap<String, Arc<Recipe>>>,
}

impl<L: RecipeLoader> CachedLoader<L> {
  pub fn new(inner: L) -> Self {
    Self {
      inner,
      cache: RwLock::new(HashMap::new()),
    }
  }

  pub async fn len(&self) -> usize {
    self.cache.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.cache.read().await.is_empty()
  }

  /// Drop every cached recipe.
  pub async fn clear(&self) {
    self.cache.write().await.clear();
  }
}

#[async_trait]
impl<L: RecipeLoader> RecipeLoader for CachedLoader<L> {
  async fn load(&self, name: &str) -> Result<Arc<Recipe>, LoadError> {
    if let Some(recipe) = self.cache.read().await.get(name) {
      trace!(recipe = name, "recipe cache hit");
      return Ok(Arc::clone(recipe));
    }

    let recipe = self.inner.load(name).await?;
    self.cache.write().await.insert(name.to_string(), Arc::clone(&recipe));
    Ok(recipe)
  }
}
