//! Platform predicates on recipe steps.
//!
//! A [`Predicate`] is a set of optional fields, each a list of acceptable
//! values. Present fields are ANDed, values within a field are ORed, and an
//! absent or empty field imposes no constraint. A target attribute that is
//! unknown satisfies any field that constrains it; [`Evaluation::Assumed`]
//! records when that happened so callers can apply an
//! [`UnknownAttributePolicy`].

mod constraint;

use kiln_platform::{Arch, Gpu, Libc, LinuxFamily, Os, PlatformError, Target, TargetField};
use serde::{Deserialize, Deserializer, Serialize};

pub use constraint::Constraint;

/// A step's platform condition.
///
/// In recipe documents each field accepts either a single string or a list:
///
/// ```toml
/// when = { os = "linux", gpu = ["nvidia", "amd"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Predicate {
  /// `os/arch` tuples, e.g. `linux/amd64`.
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
  pub platform: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
  pub os: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
  pub arch: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
  pub libc: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
  pub linux_family: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
  pub gpu: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
  pub package_manager: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Some(match OneOrMany::deserialize(deserializer)? {
    OneOrMany::One(value) => vec![value],
    OneOrMany::Many(values) => values,
  }))
}

/// Result of evaluating a predicate against a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
  /// Every constrained field matched a known target attribute.
  Matched,
  /// Some constrained field rejected a known target attribute.
  Unmatched,
  /// No field rejected the target, but the listed fields were only
  /// satisfied because the target does not know that attribute.
  Assumed(Vec<TargetField>),
}

impl Evaluation {
  pub fn is_match(&self) -> bool {
    !matches!(self, Evaluation::Unmatched)
  }

  /// Combine two evaluations that must both hold.
  pub fn and(self, other: Evaluation) -> Evaluation {
    match (self, other) {
      (Evaluation::Unmatched, _) | (_, Evaluation::Unmatched) => Evaluation::Unmatched,
      (Evaluation::Matched, e) | (e, Evaluation::Matched) => e,
      (Evaluation::Assumed(mut a), Evaluation::Assumed(b)) => {
        a.extend(b);
        a.sort();
        a.dedup();
        Evaluation::Assumed(a)
      }
    }
  }
}

/// What to do with a step that matched only because of unknown target attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownAttributePolicy {
  /// Treat the step as selected (wildcard-pass).
  #[default]
  Include,
  /// Treat the step as not selected.
  Exclude,
  /// Fail, so the caller must supply the missing attribute.
  Reject,
}

impl UnknownAttributePolicy {
  /// Decide whether an evaluation selects its step.
  ///
  /// Returns `Err` with the unknown fields when the policy is `Reject` and the
  /// evaluation was only assumed.
  pub fn admits(&self, evaluation: &Evaluation) -> Result<bool, Vec<TargetField>> {
    match (evaluation, self) {
      (Evaluation::Matched, _) => Ok(true),
      (Evaluation::Unmatched, _) => Ok(false),
      (Evaluation::Assumed(_), UnknownAttributePolicy::Include) => Ok(true),
      (Evaluation::Assumed(_), UnknownAttributePolicy::Exclude) => Ok(false),
      (Evaluation::Assumed(fields), UnknownAttributePolicy::Reject) => Err(fields.clone()),
    }
  }
}

impl Predicate {
  /// The predicate that matches every target.
  pub fn any() -> Self {
    Self::default()
  }

  /// Builder used mostly by action kinds and tests: constrain `field` to `values`.
  pub fn with<I, S>(mut self, field: TargetField, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    *self.slot_mut(field) = Some(values.into_iter().map(Into::into).collect());
    self
  }

  /// Values listed for `field`, if the field is present.
  pub fn values(&self, field: TargetField) -> Option<&[String]> {
    match field {
      TargetField::Platform => self.platform.as_deref(),
      TargetField::Os => self.os.as_deref(),
      TargetField::Arch => self.arch.as_deref(),
      TargetField::Libc => self.libc.as_deref(),
      TargetField::LinuxFamily => self.linux_family.as_deref(),
      TargetField::Gpu => self.gpu.as_deref(),
      TargetField::PackageManager => self.package_manager.as_deref(),
    }
  }

  fn slot_mut(&mut self, field: TargetField) -> &mut Option<Vec<String>> {
    match field {
      TargetField::Platform => &mut self.platform,
      TargetField::Os => &mut self.os,
      TargetField::Arch => &mut self.arch,
      TargetField::Libc => &mut self.libc,
      TargetField::LinuxFamily => &mut self.linux_family,
      TargetField::Gpu => &mut self.gpu,
      TargetField::PackageManager => &mut self.package_manager,
    }
  }

  /// Fields that actually constrain matching (present and non-empty).
  pub fn constrained_fields(&self) -> Vec<TargetField> {
    TargetField::ALL
      .iter()
      .copied()
      .filter(|f| self.values(*f).is_some_and(|v| !v.is_empty()))
      .collect()
  }

  /// True when the predicate matches every target.
  pub fn is_empty(&self) -> bool {
    self.constrained_fields().is_empty()
  }

  pub fn evaluate(&self, target: &Target) -> Evaluation {
    let mut assumed = Vec::new();

    for field in self.constrained_fields() {
      let Some(values) = self.values(field) else {
        continue;
      };
      let Some(actual) = target.attribute(field) else {
        if field == TargetField::Platform && !values.iter().any(|v| platform_may_match(v, target)) {
          return Evaluation::Unmatched;
        }
        assumed.push(field);
        continue;
      };
      if !values.iter().any(|v| canonical(field, v) == actual) {
        return Evaluation::Unmatched;
      }
    }

    if assumed.is_empty() {
      Evaluation::Matched
    } else {
      Evaluation::Assumed(assumed)
    }
  }

  /// Whether the predicate admits `target`, treating unknown attributes as wildcards.
  pub fn matches(&self, target: &Target) -> bool {
    self.evaluate(target).is_match()
  }

  /// A constraint that holds only when both predicates hold.
  pub fn and(self, other: Predicate) -> Constraint {
    Constraint::from(self).and(other)
  }

  /// Check every listed value against its field's vocabulary.
  pub fn validate(&self) -> Result<(), PlatformError> {
    for field in self.constrained_fields() {
      for value in self.values(field).unwrap_or_default() {
        field.validate(value)?;
      }
    }
    Ok(())
  }
}

/// Whether an `os/arch` tuple agrees with the half of the target that is known.
fn platform_may_match(value: &str, target: &Target) -> bool {
  let tuple = canonical(TargetField::Platform, value);
  let Some((os, arch)) = tuple.split_once('/') else {
    return target.os().is_none() && target.arch().is_none();
  };
  target.os().is_none_or(|known| known.as_str() == os) && target.arch().is_none_or(|known| known.as_str() == arch)
}

/// Normalize a predicate value to the spelling `Target::attribute` produces,
/// so `x86_64` in a recipe matches an `amd64` target.
fn canonical(field: TargetField, value: &str) -> String {
  fn norm<T: std::str::FromStr>(value: &str, as_str: impl Fn(T) -> &'static str) -> String {
    value
      .parse::<T>()
      .map(|v| as_str(v).to_string())
      .unwrap_or_else(|_| value.to_ascii_lowercase())
  }

  match field {
    TargetField::Platform => match value.split_once('/') {
      Some((os, arch)) => format!(
        "{}/{}",
        canonical(TargetField::Os, os),
        canonical(TargetField::Arch, arch)
      ),
      None => value.to_ascii_lowercase(),
    },
    TargetField::Os => norm::<Os>(value, |v| v.as_str()),
    TargetField::Arch => norm::<Arch>(value, |v| v.as_str()),
    TargetField::Libc => norm::<Libc>(value, |v| v.as_str()),
    TargetField::LinuxFamily => norm::<LinuxFamily>(value, |v| v.as_str()),
    TargetField::Gpu => norm::<Gpu>(value, |v| v.as_str()),
    TargetField::PackageManager => value.trim().to_ascii_lowercase(),
  }
}
