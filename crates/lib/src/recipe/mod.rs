//! Recipes: parsed documents, the loader boundary, step selection and validation.

mod loader;
mod select;
mod types;
mod validate;

pub use loader::{CachedLoader, DirLoader, LoadError, MemoryLoader, RecipeLoader};
pub use select::{SelectError, SelectedStep, direct_dependencies, select_steps};
pub use types::{DependencySpec, DependencySpecError, Metadata, Params, Recipe, Step};
pub use validate::{ValidationIssue, validate_recipe};
