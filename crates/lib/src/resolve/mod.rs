//! Target-sensitive dependency resolution.
//!
//! Resolution runs in two phases:
//!
//! 1. **Discovery**: recipes are loaded wave by wave, starting from the root.
//!    All recipes of a wave are loaded concurrently. Once a wave completes, its
//!    recipes are examined in name order: their steps are filtered against the
//!    target and the selected steps' dependencies form the next wave. Visited
//!    state is owned by the resolver and only touched between waves.
//! 2. **Ordering**: the discovered edges are placed into a [`ResolutionGraph`]
//!    and walked depth-first to detect cycles and produce a dependency-first
//!    order.
//!
//! Edges depend on the target, so nothing here is cached across calls.

mod graph;

pub use graph::ResolutionGraph;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kiln_platform::Target;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::action::ActionRegistry;
use crate::context::{Interrupted, ResolveContext};
use crate::predicate::UnknownAttributePolicy;
use crate::recipe::{LoadError, Recipe, RecipeLoader, SelectError, direct_dependencies};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("recipe '{name}' not found{}", required_by_suffix(.required_by))]
  RecipeNotFound { name: String, required_by: Option<String> },

  #[error("failed to load recipe '{name}': {source}")]
  Load {
    name: String,
    #[source]
    source: LoadError,
  },

  #[error("dependency cycle: {}", .path.join(" -> "))]
  Cycle { path: Vec<String> },

  #[error(transparent)]
  Selection(#[from] SelectError),

  #[error("resolution cancelled")]
  Cancelled,

  #[error("resolution timed out")]
  TimedOut,

  #[error("loader task failed: {message}")]
  Task { message: String },
}

fn required_by_suffix(parent: &Option<String>) -> String {
  match parent {
    Some(parent) => format!(" (required by '{}')", parent),
    None => String::new(),
  }
}

impl From<Interrupted> for ResolveError {
  fn from(interrupted: Interrupted) -> Self {
    match interrupted {
      Interrupted::Cancelled => ResolveError::Cancelled,
      Interrupted::TimedOut => ResolveError::TimedOut,
    }
  }
}

/// Settings for one resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
  pub policy: UnknownAttributePolicy,
  pub context: ResolveContext,
}

/// The outcome of resolving a root recipe for one target.
#[derive(Debug, Clone)]
pub struct Resolution {
  root: String,
  order: Vec<String>,
  recipes: BTreeMap<String, Arc<Recipe>>,
  edges: BTreeMap<String, Vec<String>>,
  requested: BTreeMap<String, String>,
}

impl Resolution {
  pub fn root(&self) -> &str {
    &self.root
  }

  /// Every reachable recipe, dependencies before dependents, root last.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  pub fn recipe(&self, name: &str) -> Option<&Arc<Recipe>> {
    self.recipes.get(name)
  }

  /// Direct dependencies of `name` for this target, sorted.
  pub fn dependencies(&self, name: &str) -> &[String] {
    self.edges.get(name).map(Vec::as_slice).unwrap_or_default()
  }

  /// Version requested for `name` by a depending recipe (`name@version`).
  pub fn requested_version(&self, name: &str) -> Option<&str> {
    self.requested.get(name).map(String::as_str)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.recipes.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }
}

/// Resolve `root` and everything it transitively depends on for `target`.
///
/// Fails on the first missing recipe, on a cycle, or when the context is
/// cancelled. No partial resolution is ever returned.
pub async fn resolve_transitive(
  root: &str,
  target: &Target,
  options: &ResolveOptions,
  registry: &ActionRegistry,
  loader: &Arc<dyn RecipeLoader>,
) -> Result<Resolution, ResolveError> {
  debug!(root, host = %target, "resolving dependencies");

  let mut recipes: BTreeMap<String, Arc<Recipe>> = BTreeMap::new();
  let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
  let mut requested: BTreeMap<String, String> = BTreeMap::new();
  let mut required_by: BTreeMap<String, String> = BTreeMap::new();
  let mut seen: BTreeSet<String> = BTreeSet::from([root.to_string()]);

  let mut wave = vec![root.to_string()];
  while !wave.is_empty() {
    options.context.check()?;
    trace!(size = wave.len(), "loading wave");

    let loaded = load_wave(&wave, loader, &options.context).await?;
    let mut next = BTreeSet::new();

    for (name, result) in loaded {
      let recipe = result.map_err(|e| match e {
        LoadError::NotFound { .. } => ResolveError::RecipeNotFound {
          required_by: required_by.get(&name).cloned(),
          name: name.clone(),
        },
        source => ResolveError::Load {
          name: name.clone(),
          source,
        },
      })?;

      let deps = direct_dependencies(&recipe, target, registry, options.policy)?;
      for dep in &deps {
        if let Some(version) = &dep.version {
          match requested.get(&dep.name) {
            Some(existing) if existing != version => {
              warn!(
                recipe = %dep.name,
                kept = %existing,
                ignored = %version,
                requested_by = %name,
                "conflicting dependency version requests"
              );
            }
            Some(_) => {}
            None => {
              requested.insert(dep.name.clone(), version.clone());
            }
          }
        }
        if seen.insert(dep.name.clone()) {
          required_by.insert(dep.name.clone(), name.clone());
          next.insert(dep.name.clone());
        }
      }

      edges.insert(name.clone(), deps.into_iter().map(|d| d.name).collect());
      recipes.insert(name, recipe);
    }

    wave = next.into_iter().collect();
  }

  let graph = ResolutionGraph::from_edges(&edges);
  let order = graph
    .dependency_order(root)
    .map_err(|path| ResolveError::Cycle { path })?;

  debug!(root, recipes = order.len(), "resolved dependencies");
  Ok(Resolution {
    root: root.to_string(),
    order,
    recipes,
    edges,
    requested,
  })
}

type WaveResult = Vec<(String, Result<Arc<Recipe>, LoadError>)>;

/// Load every recipe of a wave concurrently. Results come back sorted by name.
async fn load_wave(
  names: &[String],
  loader: &Arc<dyn RecipeLoader>,
  context: &ResolveContext,
) -> Result<WaveResult, ResolveError> {
  let mut join_set = JoinSet::new();

  for name in names {
    let name = name.clone();
    let loader = Arc::clone(loader);
    let context = context.clone();

    join_set.spawn(async move {
      let result = context.run(loader.load(&name)).await;
      (name, result)
    });
  }

  let mut results = Vec::with_capacity(names.len());
  while let Some(joined) = join_set.join_next().await {
    let (name, result) = joined.map_err(|e| ResolveError::Task { message: e.to_string() })?;
    results.push((name, result?));
  }

  results.sort_by(|a, b| a.0.cmp(&b.0));
  Ok(results)
}
