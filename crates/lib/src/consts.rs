//! Crate-wide constants.

/// Version of the serialized plan format. Plans with any other value are rejected.
pub const PLAN_FORMAT_VERSION: u32 = 1;

/// Maximum nesting of composite action decomposition.
pub const MAX_DECOMPOSE_DEPTH: usize = 16;

/// Version used when no version source could be resolved.
pub const DEV_VERSION: &str = "dev";

/// Version requests that mean "whatever the version source considers current".
pub const LATEST_VERSION: &str = "latest";

/// File extension of recipe documents.
pub const RECIPE_EXTENSION: &str = "toml";
