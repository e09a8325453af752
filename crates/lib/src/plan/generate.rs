//! Plan generation.
//!
//! # Flow
//!
//! 1. Resolve the recipe tree for the target ([`resolve_transitive`]).
//! 2. For each recipe, dependencies first: check `metadata.supported`, resolve
//!    its version, select its steps, expand templates, decompose composites
//!    and classify every resulting step.
//! 3. Nest the per-recipe plans into a tree. A dependency shared by several
//!    recipes is placed once, under the first parent that reaches it.
//!
//! Decomposed steps are never filtered again: they inherit the selection of
//! the step they came from.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kiln_platform::Target;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::pin::PinSet;
use super::template::{TemplateVars, expand_params};
use super::types::{Plan, ResolvedStep};
use crate::action::{ActionContext, ActionError, ActionRegistry, decompose_to_primitives};
use crate::consts::{LATEST_VERSION, PLAN_FORMAT_VERSION};
use crate::context::{Interrupted, ResolveContext};
use crate::predicate::UnknownAttributePolicy;
use crate::recipe::{Recipe, RecipeLoader, SelectError, select_steps};
use crate::resolve::{Resolution, ResolveError, ResolveOptions, resolve_transitive};
use crate::version::{VersionInfo, VersionResolver};

#[derive(Debug, Error)]
pub enum GenerateError {
  #[error(transparent)]
  Resolve(ResolveError),

  #[error(transparent)]
  Selection(#[from] SelectError),

  #[error("'{tool}' does not support {target}")]
  UnsupportedPlatform { tool: String, target: Target },

  #[error("'{tool}': {source}")]
  Action {
    tool: String,
    #[source]
    source: ActionError,
  },

  #[error("plan generation cancelled")]
  Cancelled,

  #[error("plan generation timed out")]
  TimedOut,

  #[error("failed to hash recipe: {0}")]
  Hash(#[from] serde_json::Error),

  #[error("generation task failed: {message}")]
  Task { message: String },
}

// Interruptions keep their own variants whichever stage they hit.
impl From<ResolveError> for GenerateError {
  fn from(error: ResolveError) -> Self {
    match error {
      ResolveError::Cancelled => GenerateError::Cancelled,
      ResolveError::TimedOut => GenerateError::TimedOut,
      other => GenerateError::Resolve(other),
    }
  }
}

impl From<Interrupted> for GenerateError {
  fn from(interrupted: Interrupted) -> Self {
    match interrupted {
      Interrupted::Cancelled => GenerateError::Cancelled,
      Interrupted::TimedOut => GenerateError::TimedOut,
    }
  }
}

/// Options for one plan generation.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
  /// Exact version of the root tool. `None` or `latest` asks the version resolver.
  pub version: Option<String>,
  /// Versions taken from an earlier plan; they win over dependency requests.
  pub pin_from: Option<PinSet>,
  /// Mark every step non-deterministic, deferring resolution to install time.
  pub evaluate_at_install: bool,
  /// What to do with steps that only match because a target attribute is unknown.
  pub unknown_attributes: UnknownAttributePolicy,
  pub context: ResolveContext,
}

/// Generates plans from recipes.
///
/// Holds only shared, immutable collaborators, so one generator can serve
/// many concurrent generations.
#[derive(Clone)]
pub struct PlanGenerator {
  loader: Arc<dyn RecipeLoader>,
  registry: Arc<ActionRegistry>,
  versions: Arc<dyn VersionResolver>,
}

impl PlanGenerator {
  pub fn new(loader: Arc<dyn RecipeLoader>, registry: Arc<ActionRegistry>, versions: Arc<dyn VersionResolver>) -> Self {
    Self {
      loader,
      registry,
      versions,
    }
  }

  pub fn registry(&self) -> &ActionRegistry {
    &self.registry
  }

  /// Generate the plan for `root` on `target`.
  ///
  /// Either the whole plan is produced or an error is returned; a cancelled
  /// or timed-out context fails the generation.
  pub async fn generate(&self, root: &str, target: &Target, options: &PlanOptions) -> Result<Plan, GenerateError> {
    options.context.check()?;
    debug!(tool = root, host = %target, "generating plan");

    let resolve_options = ResolveOptions {
      policy: options.unknown_attributes,
      context: options.context.clone(),
    };
    let resolution = resolve_transitive(root, target, &resolve_options, &self.registry, &self.loader).await?;

    let mut plans = BTreeMap::new();
    for name in resolution.order() {
      options.context.check()?;
      let recipe = resolution.recipe(name).ok_or_else(|| ResolveError::RecipeNotFound {
        name: name.clone(),
        required_by: None,
      })?;
      let requested = self.requested_version(name, root, &resolution, options);
      let plan = self.plan_recipe(recipe, requested.as_deref(), target, options).await?;
      plans.insert(name.clone(), plan);
    }

    let mut placed = BTreeSet::from([root.to_string()]);
    let plan = assemble(root, &resolution, &mut plans, &mut placed);

    debug!(
      tool = %plan.tool,
      version = %plan.version,
      plans = plan.plan_count(),
      deterministic = plan.deterministic,
      "generated plan"
    );
    Ok(plan)
  }

  /// Version to ask the resolver for: the explicit root version, then a pin,
  /// then a request from a depending recipe.
  fn requested_version(
    &self,
    name: &str,
    root: &str,
    resolution: &Resolution,
    options: &PlanOptions,
  ) -> Option<String> {
    let explicit = if name == root {
      options
        .version
        .as_deref()
        .filter(|v| !v.is_empty() && *v != LATEST_VERSION)
    } else {
      None
    };

    explicit
      .or_else(|| options.pin_from.as_ref().and_then(|pins| pins.get(name)))
      .or_else(|| resolution.requested_version(name))
      .map(str::to_string)
  }

  async fn resolve_version(
    &self,
    recipe: &Recipe,
    requested: Option<&str>,
    context: &ResolveContext,
  ) -> Result<VersionInfo, GenerateError> {
    match context.run(self.versions.resolve(recipe, requested)).await? {
      Ok(version) => Ok(version),
      Err(e) => {
        warn!(recipe = recipe.name(), error = %e, "version resolution failed, using dev");
        Ok(VersionInfo::dev())
      }
    }
  }

  /// Plan a single recipe, without its dependencies.
  async fn plan_recipe(
    &self,
    recipe: &Recipe,
    requested: Option<&str>,
    target: &Target,
    options: &PlanOptions,
  ) -> Result<Plan, GenerateError> {
    let tool = recipe.name();
    if !recipe.metadata.supported.matches(target) {
      return Err(GenerateError::UnsupportedPlatform {
        tool: tool.to_string(),
        target: target.clone(),
      });
    }

    let version = self.resolve_version(recipe, requested, &options.context).await?;
    let vars = TemplateVars::new(&version, target);
    let ctx = ActionContext {
      tool,
      version: &version,
      target,
    };
    let action_error = |source: ActionError| GenerateError::Action {
      tool: tool.to_string(),
      source,
    };

    let mut steps = Vec::new();
    for selected in select_steps(recipe, target, &self.registry, options.unknown_attributes)? {
      let params = expand_params(&selected.step.params, &vars);
      let primitives =
        decompose_to_primitives(&self.registry, &selected.step.action, &params, &ctx).map_err(action_error)?;

      for primitive in primitives {
        let kind = self.registry.kind(&primitive.action).map_err(action_error)?;
        let deterministic = kind.is_deterministic() && version.deterministic && !options.evaluate_at_install;
        if !kind.is_evaluable() {
          debug!(recipe = tool, action = %primitive.action, "step can only be evaluated at install time");
        }

        let mut step = ResolvedStep {
          action: primitive.action,
          params: primitive.params,
          evaluable: kind.is_evaluable(),
          deterministic,
          url: None,
          checksum: primitive.checksum,
          size: primitive.size,
        };

        if deterministic && let Some(resolver) = kind.resolver() {
          let artifact = options
            .context
            .run(resolver.resolve(&step.action, &step.params, &ctx))
            .await?
            .map_err(action_error)?;
          step.url = artifact.url;
          step.checksum = step.checksum.or(artifact.checksum);
          step.size = step.size.or(artifact.size);
        }

        trace!(recipe = tool, action = %step.action, deterministic, "resolved step");
        steps.push(step);
      }
    }

    let deterministic = steps.iter().all(|s| s.deterministic);
    Ok(Plan {
      format_version: PLAN_FORMAT_VERSION,
      tool: tool.to_string(),
      version: version.version,
      platform: target.clone(),
      recipe_hash: recipe.content_hash()?,
      deterministic,
      dependencies: Vec::new(),
      steps,
    })
  }
}

/// Nest per-recipe plans under their parents, placing each dependency once.
fn assemble(
  name: &str,
  resolution: &Resolution,
  plans: &mut BTreeMap<String, Plan>,
  placed: &mut BTreeSet<String>,
) -> Plan {
  let mut plan = plans.remove(name).unwrap_or_else(|| empty_plan(name));

  for dep in resolution.dependencies(name) {
    if placed.insert(dep.clone()) {
      plan.dependencies.push(assemble(dep, resolution, plans, placed));
    }
  }

  plan.deterministic = plan.steps.iter().all(|s| s.deterministic) && plan.dependencies.iter().all(|d| d.deterministic);
  plan
}

// Only reachable if a recipe in the resolution order was never planned.
fn empty_plan(name: &str) -> Plan {
  Plan {
    format_version: PLAN_FORMAT_VERSION,
    tool: name.to_string(),
    version: String::new(),
    platform: Target::unknown(),
    recipe_hash: crate::util::hash::ContentHash(String::new()),
    deterministic: true,
    dependencies: Vec::new(),
    steps: Vec::new(),
  }
}
