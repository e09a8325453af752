//! kiln-lib: recipe resolution and deterministic plan generation for kiln.
//!
//! This crate turns declarative, platform-conditional recipes into
//! machine-specific installation plans:
//! - `predicate`: platform conditions on recipe steps
//! - `recipe`: the recipe document and the loader boundary
//! - `action`: the registry of action kinds and their capabilities
//! - `resolve`: target-sensitive dependency resolution
//! - `plan`: plan generation, comparison, golden files and batch runs

pub mod action;
pub mod consts;
pub mod context;
pub mod plan;
pub mod predicate;
pub mod recipe;
pub mod resolve;
pub mod util;
pub mod version;
