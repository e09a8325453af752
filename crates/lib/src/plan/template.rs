//! `{variable}` expansion in step parameters.

use std::collections::BTreeMap;

use kiln_platform::Target;
use serde_json::Value;

use crate::recipe::Params;
use crate::version::VersionInfo;

const OS_MAPPING: &str = "os_mapping";
const ARCH_MAPPING: &str = "arch_mapping";

/// Values substituted for `{name}` placeholders.
///
/// Unknown target attributes have no variable, so their placeholders are left
/// in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
  vars: BTreeMap<&'static str, String>,
}

impl TemplateVars {
  pub fn new(version: &VersionInfo, target: &Target) -> Self {
    let mut vars = BTreeMap::new();
    vars.insert("version", version.version.clone());
    vars.insert("version_tag", version.tag.clone());
    if let Some(os) = target.os() {
      vars.insert("os", os.to_string());
    }
    if let Some(arch) = target.arch() {
      vars.insert("arch", arch.to_string());
    }
    if let Some(libc) = target.libc() {
      vars.insert("libc", libc.to_string());
    }
    if let Some(family) = target.linux_family() {
      vars.insert("linux_family", family.to_string());
    }
    if let Some(gpu) = target.gpu() {
      vars.insert("gpu", gpu.to_string());
    }
    Self { vars }
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.get(name).map(String::as_str)
  }

  /// Apply a step's `os_mapping` / `arch_mapping` tables, e.g.
  /// `os_mapping = { darwin = "macos" }`.
  fn mapped(&self, params: &Params) -> Self {
    let mut mapped = self.clone();
    for (key, var) in [(OS_MAPPING, "os"), (ARCH_MAPPING, "arch")] {
      let Some(table) = params.get(key).and_then(Value::as_object) else {
        continue;
      };
      if let Some(current) = self.vars.get(var)
        && let Some(replacement) = table.get(current).and_then(Value::as_str)
      {
        mapped.vars.insert(var, replacement.to_string());
      }
    }
    mapped
  }

  fn expand_str(&self, s: &str) -> String {
    let mut out = s.to_string();
    for (name, value) in &self.vars {
      out = out.replace(&format!("{{{}}}", name), value);
    }
    out
  }

  fn expand_value(&self, value: &Value) -> Value {
    match value {
      Value::String(s) => Value::String(self.expand_str(s)),
      Value::Array(items) => Value::Array(items.iter().map(|v| self.expand_value(v)).collect()),
      Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), self.expand_value(v))).collect()),
      other => other.clone(),
    }
  }
}

/// Expand placeholders in every string of `params`, recursively.
///
/// The mapping tables are consumed: they are applied to the variables and do
/// not appear in the result.
pub fn expand_params(params: &Params, vars: &TemplateVars) -> Params {
  let vars = vars.mapped(params);
  params
    .iter()
    .filter(|(key, _)| key.as_str() != OS_MAPPING && key.as_str() != ARCH_MAPPING)
    .map(|(key, value)| (key.clone(), vars.expand_value(value)))
    .collect()
}
