//! Golden plan files.
//!
//! # Layout
//!
//! ```text
//! <dir>/
//! └── r/
//!     └── ripgrep/
//!         ├── v14.1.0-darwin-arm64.json
//!         └── v14.1.0-linux-amd64-debian.json
//! ```
//!
//! The linux family suffix is only present when the family is known and not
//! `none`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_platform::{LinuxFamily, TargetField};
use thiserror::Error;
use tracing::debug;

use super::compare::{CompareError, compare};
use super::types::{Plan, PlanFormatError};
use crate::action::ActionRegistry;

/// Target attributes a golden file and a fresh plan must share before their
/// contents are compared.
const GOLDEN_FIELDS: &[TargetField] = &[
  TargetField::Os,
  TargetField::Arch,
  TargetField::Libc,
  TargetField::LinuxFamily,
  TargetField::Gpu,
];

#[derive(Debug, Error)]
pub enum GoldenError {
  #[error("no golden plan at {path}")]
  Missing { path: PathBuf },

  #[error("golden file I/O failed at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid golden plan at {path}: {source}")]
  Format {
    path: PathBuf,
    #[source]
    source: PlanFormatError,
  },

  #[error("failed to serialize plan: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("golden plan at {path} was generated for {reference}, not {candidate}")]
  PlatformMismatch {
    path: PathBuf,
    reference: String,
    candidate: String,
  },

  #[error(transparent)]
  Compare(#[from] CompareError),
}

/// Where the golden file for `plan` lives under `dir`.
pub fn golden_path(dir: &Path, plan: &Plan) -> PathBuf {
  let letter = plan
    .tool
    .chars()
    .next()
    .map(|c| c.to_ascii_lowercase().to_string())
    .unwrap_or_else(|| "_".to_string());

  let os = plan.platform.os().map_or("unknown", |os| os.as_str());
  let arch = plan.platform.arch().map_or("unknown", |arch| arch.as_str());
  let mut file = format!("v{}-{}-{}", plan.version, os, arch);
  if let Some(family) = plan.platform.linux_family()
    && family != LinuxFamily::None
  {
    file.push('-');
    file.push_str(family.as_str());
  }
  file.push_str(".json");

  dir.join(letter).join(&plan.tool).join(file)
}

pub fn read_plan(path: &Path) -> Result<Plan, GoldenError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      return Err(GoldenError::Missing {
        path: path.to_path_buf(),
      });
    }
    Err(source) => {
      return Err(GoldenError::Io {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  Plan::from_json(&content).map_err(|source| GoldenError::Format {
    path: path.to_path_buf(),
    source,
  })
}

/// Write `plan` to its golden path under `dir`, replacing any existing file.
///
/// Writes to a temporary file first and renames it into place.
pub fn write_plan(dir: &Path, plan: &Plan) -> Result<PathBuf, GoldenError> {
  let path = golden_path(dir, plan);
  let io_err = |source: io::Error| GoldenError::Io {
    path: path.clone(),
    source,
  };

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(io_err)?;
  }

  let mut content = plan.to_json()?;
  content.push('\n');
  let temp = path.with_extension("json.tmp");
  fs::write(&temp, content).map_err(io_err)?;
  if let Err(e) = fs::rename(&temp, &path) {
    let _ = fs::remove_file(&temp);
    return Err(io_err(e));
  }

  debug!(tool = %plan.tool, path = %path.display(), "wrote golden plan");
  Ok(path)
}

/// Compare `candidate` with its golden file under `dir`.
pub fn check_golden(dir: &Path, candidate: &Plan, registry: &ActionRegistry) -> Result<(), GoldenError> {
  let path = golden_path(dir, candidate);
  let reference = read_plan(&path)?;

  if !reference.platform.agrees_on(&candidate.platform, GOLDEN_FIELDS) {
    return Err(GoldenError::PlatformMismatch {
      path,
      reference: reference.platform.to_string(),
      candidate: candidate.platform.to_string(),
    });
  }

  compare(&reference, candidate, registry)?.into_result()?;
  Ok(())
}
