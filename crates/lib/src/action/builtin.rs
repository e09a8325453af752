//! The default action catalog.
//!
//! Primitives are what plans contain. Composites only exist in recipes and
//! are always decomposed into primitives during plan generation.

use kiln_platform::TargetField;
use serde_json::{Value, json};

use super::types::{ActionContext, ActionError, ActionKind, ActionRegistry, Decompose, DecomposedStep, ParamsArtifact};
use crate::predicate::Predicate;
use crate::recipe::Params;

const EXECUTABLE_MODE: &str = "0755";

impl ActionRegistry {
  /// A registry holding the built-in action kinds.
  pub fn builtin() -> Self {
    let mut registry = Self::new();

    // File primitives.
    registry
      .register(
        ActionKind::new("download_file")
          .with_resolver(ParamsArtifact)
          .with_security_params(["dest"]),
      )
      .register(ActionKind::new("extract").with_security_params(["archive", "format", "strip_dirs"]))
      .register(ActionKind::new("chmod").with_security_params(["files", "mode"]))
      .register(ActionKind::new("install_binaries").with_security_params(["binaries", "install_mode"]))
      .register(ActionKind::new("install_libraries").with_security_params(["patterns"]))
      .register(ActionKind::new("set_env").with_security_params(["vars"]))
      .register(ActionKind::new("link_dependencies").with_security_params(["library", "version"]))
      .register(ActionKind::new("apply_patch_file").with_security_params(["file", "strip"]))
      .register(ActionKind::new("configure_make").with_security_params([
        "source_dir",
        "configure_args",
        "executables",
      ]));

    // Ecosystem primitives: evaluable now, but the ecosystem decides the
    // transitive package set, so the result is not reproducible.
    for (name, identity, runtime) in ECOSYSTEMS {
      registry.register(
        ActionKind::new(name.primitive)
          .non_deterministic()
          .with_dependencies([*runtime])
          .with_security_params([*identity, "version", "executables"]),
      );
      registry.register(
        ActionKind::new(name.composite)
          .with_dependencies([*runtime])
          .with_decomposer(Ecosystem {
            primitive: name.primitive,
            identity: *identity,
          }),
      );
    }

    registry.register(
      ActionKind::new("run_command")
        .not_evaluable()
        .with_security_params(["command"]),
    );

    // System package managers.
    for (name, field, value) in SYSTEM_PACKAGES {
      registry.register(
        ActionKind::new(*name)
          .not_evaluable()
          .with_constraint(Predicate::any().with(*field, [*value]))
          .with_security_params(["packages"]),
      );
    }

    // Download composites.
    registry
      .register(ActionKind::new("download_archive").with_decomposer(download_archive))
      .register(ActionKind::new("github_archive").with_decomposer(github_archive))
      .register(ActionKind::new("github_file").with_decomposer(github_file));

    registry
  }
}

struct EcosystemNames {
  composite: &'static str,
  primitive: &'static str,
}

/// (names, identity parameter, runtime dependency)
const ECOSYSTEMS: &[(EcosystemNames, &str, &str)] = &[
  (
    EcosystemNames {
      composite: "npm_install",
      primitive: "npm_exec",
    },
    "package",
    "nodejs",
  ),
  (
    EcosystemNames {
      composite: "pipx_install",
      primitive: "pip_exec",
    },
    "package",
    "python",
  ),
  (
    EcosystemNames {
      composite: "cargo_install",
      primitive: "cargo_build",
    },
    "crate",
    "rust",
  ),
  (
    EcosystemNames {
      composite: "go_install",
      primitive: "go_build",
    },
    "module",
    "go",
  ),
  (
    EcosystemNames {
      composite: "gem_install",
      primitive: "gem_exec",
    },
    "gem",
    "ruby",
  ),
];

const SYSTEM_PACKAGES: &[(&str, TargetField, &str)] = &[
  ("apt_install", TargetField::LinuxFamily, "debian"),
  ("dnf_install", TargetField::LinuxFamily, "rhel"),
  ("pacman_install", TargetField::LinuxFamily, "arch"),
  ("apk_install", TargetField::LinuxFamily, "alpine"),
  ("zypper_install", TargetField::LinuxFamily, "suse"),
  ("brew_install", TargetField::Os, "darwin"),
];

/// `<eco>_install { <identity>, executables }` becomes
/// `<eco>_exec { <identity>, version, executables }`.
struct Ecosystem {
  primitive: &'static str,
  identity: &'static str,
}

impl Decompose for Ecosystem {
  fn decompose(&self, params: &Params, ctx: &ActionContext<'_>) -> Result<Vec<DecomposedStep>, ActionError> {
    let identity = required_str(self.primitive, params, self.identity)?;
    let executables = params
      .get("executables")
      .cloned()
      .unwrap_or_else(|| json!([identity.rsplit('/').next().unwrap_or(identity)]));

    let mut out = Params::new();
    out.insert(self.identity.to_string(), json!(identity));
    out.insert("version".to_string(), json!(ctx.version.version));
    out.insert("executables".to_string(), executables);
    for (key, value) in params {
      if !out.contains_key(key) {
        out.insert(key.clone(), value.clone());
      }
    }
    Ok(vec![DecomposedStep::new(self.primitive, out)])
  }
}

fn download_archive(params: &Params, _ctx: &ActionContext<'_>) -> Result<Vec<DecomposedStep>, ActionError> {
  let url = required_str("download_archive", params, "url")?;
  archive_steps("download_archive", url, params)
}

fn github_archive(params: &Params, ctx: &ActionContext<'_>) -> Result<Vec<DecomposedStep>, ActionError> {
  let url = github_release_url("github_archive", params, ctx)?;
  archive_steps("github_archive", &url, params)
}

fn github_file(params: &Params, ctx: &ActionContext<'_>) -> Result<Vec<DecomposedStep>, ActionError> {
  let url = github_release_url("github_file", params, ctx)?;
  let binary = required_str("github_file", params, "binary")?;

  let mut download = DecomposedStep::new(
    "download_file",
    params_of([("url", json!(url)), ("dest", json!(binary))]),
  );
  download.checksum = optional_str(params, "checksum").map(str::to_string);

  Ok(vec![
    download,
    DecomposedStep::new(
      "chmod",
      params_of([("files", json!([binary])), ("mode", json!(EXECUTABLE_MODE))]),
    ),
    DecomposedStep::new("install_binaries", params_of([("binaries", json!([binary]))])),
  ])
}

fn github_release_url(action: &str, params: &Params, ctx: &ActionContext<'_>) -> Result<String, ActionError> {
  let repo = required_str(action, params, "repo")?;
  let asset = required_str(action, params, "asset_pattern")?;
  Ok(format!(
    "https://github.com/{}/releases/download/{}/{}",
    repo, ctx.version.tag, asset
  ))
}

/// download, extract, chmod, install: the shared tail of every archive composite.
fn archive_steps(action: &str, url: &str, params: &Params) -> Result<Vec<DecomposedStep>, ActionError> {
  let dest = url.rsplit('/').next().filter(|s| !s.is_empty()).ok_or_else(|| ActionError::InvalidParam {
    action: action.to_string(),
    param: "url".to_string(),
    message: "url has no file name".to_string(),
  })?;
  let format = match optional_str(params, "archive_format") {
    Some(format) => format.to_string(),
    None => archive_format(dest).ok_or_else(|| ActionError::InvalidParam {
      action: action.to_string(),
      param: "archive_format".to_string(),
      message: format!("cannot infer archive format from '{}'", dest),
    })?,
  };
  let binaries = params.get("binaries").cloned().ok_or_else(|| ActionError::MissingParam {
    action: action.to_string(),
    param: "binaries".to_string(),
  })?;
  let strip_dirs = params.get("strip_dirs").cloned().unwrap_or(json!(0));

  let mut download = DecomposedStep::new("download_file", params_of([("url", json!(url)), ("dest", json!(dest))]));
  download.checksum = optional_str(params, "checksum").map(str::to_string);
  download.size = params.get("size").and_then(Value::as_u64);

  let mut install = params_of([("binaries", binaries.clone())]);
  if let Some(mode) = params.get("install_mode") {
    install.insert("install_mode".to_string(), mode.clone());
  }

  Ok(vec![
    download,
    DecomposedStep::new(
      "extract",
      params_of([
        ("archive", json!(dest)),
        ("format", json!(format)),
        ("strip_dirs", strip_dirs),
      ]),
    ),
    DecomposedStep::new(
      "chmod",
      params_of([("files", binaries), ("mode", json!(EXECUTABLE_MODE))]),
    ),
    DecomposedStep::new("install_binaries", install),
  ])
}

fn archive_format(file_name: &str) -> Option<String> {
  const FORMATS: &[(&str, &str)] = &[
    (".tar.gz", "tar.gz"),
    (".tgz", "tar.gz"),
    (".tar.xz", "tar.xz"),
    (".txz", "tar.xz"),
    (".tar.bz2", "tar.bz2"),
    (".tar.zst", "tar.zst"),
    (".tar", "tar"),
    (".zip", "zip"),
  ];
  FORMATS
    .iter()
    .find(|(ext, _)| file_name.ends_with(ext))
    .map(|(_, format)| format.to_string())
}

fn params_of<const N: usize>(entries: [(&str, Value); N]) -> Params {
  entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn optional_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
  params.get(key).and_then(Value::as_str)
}

fn required_str<'a>(action: &str, params: &'a Params, key: &str) -> Result<&'a str, ActionError> {
  match params.get(key) {
    Some(Value::String(s)) if !s.is_empty() => Ok(s),
    Some(_) => Err(ActionError::InvalidParam {
      action: action.to_string(),
      param: key.to_string(),
      message: "expected a non-empty string".to_string(),
    }),
    None => Err(ActionError::MissingParam {
      action: action.to_string(),
      param: key.to_string(),
    }),
  }
}
