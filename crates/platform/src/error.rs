//! Error types for kiln-platform

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building or detecting a target.
#[derive(Debug, Error)]
pub enum PlatformError {
  #[error("invalid {field} value '{value}' (expected one of: {expected})")]
  InvalidValue {
    field: &'static str,
    value: String,
    expected: String,
  },

  #[error("unknown linux distribution '{id}'")]
  UnknownDistro { id: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}
