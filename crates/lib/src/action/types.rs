use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kiln_platform::Target;
use serde_json::Value;
use thiserror::Error;

use crate::predicate::Predicate;
use crate::recipe::Params;
use crate::version::VersionInfo;

/// Errors raised by action kinds or while looking them up.
#[derive(Debug, Error)]
pub enum ActionError {
  #[error("unknown action '{action}'")]
  UnknownAction { action: String },

  #[error("action '{action}' is missing required parameter '{param}'")]
  MissingParam { action: String, param: String },

  #[error("action '{action}' has invalid parameter '{param}': {message}")]
  InvalidParam {
    action: String,
    param: String,
    message: String,
  },

  #[error("decomposition cycle detected at action '{action}'")]
  DecompositionCycle { action: String },

  #[error("decomposition of '{action}' exceeded {max} levels")]
  DecompositionTooDeep { action: String, max: usize },

  #[error("failed to resolve artifact for '{action}': {message}")]
  Resolve { action: String, message: String },
}

/// What an action kind is evaluated for.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
  pub tool: &'a str,
  pub version: &'a VersionInfo,
  pub target: &'a Target,
}

/// One step produced by decomposing a composite action.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedStep {
  pub action: String,
  pub params: Params,
  pub checksum: Option<String>,
  pub size: Option<u64>,
}

impl DecomposedStep {
  pub fn new(action: impl Into<String>, params: Params) -> Self {
    Self {
      action: action.into(),
      params,
      checksum: None,
      size: None,
    }
  }
}

/// Expands a composite step into simpler steps.
///
/// Implemented for plain functions with the matching signature.
pub trait Decompose: Send + Sync {
  fn decompose(&self, params: &Params, ctx: &ActionContext<'_>) -> Result<Vec<DecomposedStep>, ActionError>;
}

impl<F> Decompose for F
where
  F: Fn(&Params, &ActionContext<'_>) -> Result<Vec<DecomposedStep>, ActionError> + Send + Sync,
{
  fn decompose(&self, params: &Params, ctx: &ActionContext<'_>) -> Result<Vec<DecomposedStep>, ActionError> {
    self(params, ctx)
  }
}

/// The concrete artifact behind a deterministic step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
  pub url: Option<String>,
  pub checksum: Option<String>,
  pub size: Option<u64>,
}

/// Resolves URL, checksum and size for a deterministic step.
///
/// Implementations may perform network I/O; the planner bounds every call
/// with the caller's cancellation context.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
  async fn resolve(&self, action: &str, params: &Params, ctx: &ActionContext<'_>) -> Result<Artifact, ActionError>;
}

/// Reads `url`, `checksum` and `size` straight from the step parameters.
///
/// Used for downloads whose recipe pins the checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamsArtifact;

#[async_trait]
impl ArtifactResolver for ParamsArtifact {
  async fn resolve(&self, action: &str, params: &Params, _ctx: &ActionContext<'_>) -> Result<Artifact, ActionError> {
    let url = match params.get("url") {
      Some(Value::String(url)) => url.clone(),
      Some(_) => {
        return Err(ActionError::InvalidParam {
          action: action.to_string(),
          param: "url".to_string(),
          message: "expected a string".to_string(),
        });
      }
      None => {
        return Err(ActionError::MissingParam {
          action: action.to_string(),
          param: "url".to_string(),
        });
      }
    };
    Ok(Artifact {
      url: Some(url),
      checksum: params.get("checksum").and_then(Value::as_str).map(str::to_string),
      size: params.get("size").and_then(Value::as_u64),
    })
  }
}

/// Capability bundle for one action kind.
#[derive(Clone)]
pub struct ActionKind {
  name: String,
  evaluable: bool,
  deterministic: bool,
  decomposer: Option<Arc<dyn Decompose>>,
  resolver: Option<Arc<dyn ArtifactResolver>>,
  constraint: Option<Predicate>,
  dependencies: Vec<String>,
  security_params: Option<Vec<String>>,
}

impl fmt::Debug for ActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ActionKind")
      .field("name", &self.name)
      .field("evaluable", &self.evaluable)
      .field("deterministic", &self.deterministic)
      .field("composite", &self.decomposer.is_some())
      .field("resolver", &self.resolver.is_some())
      .field("constraint", &self.constraint)
      .field("dependencies", &self.dependencies)
      .field("security_params", &self.security_params)
      .finish()
  }
}

impl ActionKind {
  /// An evaluable, deterministic kind with no other capabilities.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      evaluable: true,
      deterministic: true,
      decomposer: None,
      resolver: None,
      constraint: None,
      dependencies: Vec::new(),
      security_params: None,
    }
  }

  /// Evaluable ahead of time, but the result depends on ecosystem state
  /// (registry resolution, lock files) and may differ between runs.
  pub fn non_deterministic(mut self) -> Self {
    self.deterministic = false;
    self
  }

  /// Can only be evaluated on the machine at install time.
  pub fn not_evaluable(mut self) -> Self {
    self.evaluable = false;
    self.deterministic = false;
    self
  }

  pub fn with_decomposer(mut self, decomposer: impl Decompose + 'static) -> Self {
    self.decomposer = Some(Arc::new(decomposer));
    self
  }

  pub fn with_resolver(mut self, resolver: impl ArtifactResolver + 'static) -> Self {
    self.resolver = Some(Arc::new(resolver));
    self
  }

  /// Restrict the kind to targets matching `constraint`, on top of each step's own predicate.
  pub fn with_constraint(mut self, constraint: Predicate) -> Self {
    self.constraint = Some(constraint);
    self
  }

  pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.dependencies = deps.into_iter().map(Into::into).collect();
    self
  }

  /// Parameters that identify what the step installs. Structural plan
  /// comparison keeps exactly these and nothing else.
  pub fn with_security_params<I, S>(mut self, params: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.security_params = Some(params.into_iter().map(Into::into).collect());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_evaluable(&self) -> bool {
    self.evaluable
  }

  pub fn is_deterministic(&self) -> bool {
    self.evaluable && self.deterministic
  }

  pub fn is_composite(&self) -> bool {
    self.decomposer.is_some()
  }

  pub fn decomposer(&self) -> Option<&dyn Decompose> {
    self.decomposer.as_deref()
  }

  pub fn resolver(&self) -> Option<&Arc<dyn ArtifactResolver>> {
    self.resolver.as_ref()
  }

  pub fn constraint(&self) -> Option<&Predicate> {
    self.constraint.as_ref()
  }

  pub fn dependencies(&self) -> &[String] {
    &self.dependencies
  }

  /// `None` means the kind is unclassified.
  pub fn security_params(&self) -> Option<&[String]> {
    self.security_params.as_deref()
  }
}

/// Action kinds by name.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
  kinds: BTreeMap<String, ActionKind>,
}

impl ActionRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `kind`, replacing any kind with the same name.
  pub fn register(&mut self, kind: ActionKind) -> &mut Self {
    self.kinds.insert(kind.name.clone(), kind);
    self
  }

  pub fn get(&self, name: &str) -> Option<&ActionKind> {
    self.kinds.get(name)
  }

  pub fn kind(&self, name: &str) -> Result<&ActionKind, ActionError> {
    self.get(name).ok_or_else(|| ActionError::UnknownAction {
      action: name.to_string(),
    })
  }

  pub fn contains(&self, name: &str) -> bool {
    self.kinds.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.kinds.keys().map(String::as_str)
  }
}
