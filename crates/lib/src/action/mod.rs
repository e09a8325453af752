//! Action kinds and the registry that describes them.
//!
//! The planner never executes actions. It only needs to know, per kind:
//! whether the kind can be evaluated ahead of time and whether that evaluation
//! is reproducible, how a composite kind expands into primitives, how a
//! deterministic primitive's artifact is resolved, which platforms the kind is
//! restricted to, which tools it implicitly needs, and which parameters
//! identify what it installs.

mod builtin;
mod decompose;
mod types;

pub use decompose::decompose_to_primitives;
pub use types::{
  ActionContext, ActionError, ActionKind, ActionRegistry, Artifact, ArtifactResolver, Decompose, DecomposedStep,
  ParamsArtifact,
};
