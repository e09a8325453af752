//! Target platform attributes and the immutable `Target` value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Defines a closed vocabulary of lowercase attribute values.
///
/// Each generated enum gets `as_str()`, `ALL`, `Display`, a case-insensitive
/// `FromStr` that also accepts the listed aliases, and matching serde names.
macro_rules! vocabulary {
  (
    $(#[$meta:meta])*
    $name:ident, $field:literal {
      $($variant:ident => $value:literal $(| $alias:literal)*),+ $(,)?
    }
  ) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub enum $name {
      $(
        #[serde(rename = $value $(, alias = $alias)*)]
        $variant,
      )+
    }

    impl $name {
      /// Every value of this attribute, in declaration order.
      pub const ALL: &'static [$name] = &[$($name::$variant),+];

      /// Returns the canonical lowercase name used in predicates and plans.
      pub const fn as_str(&self) -> &'static str {
        match self {
          $($name::$variant => $value),+
        }
      }

      fn expected() -> String {
        Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
      }
    }

    impl FromStr for $name {
      type Err = PlatformError;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
          $($value $(| $alias)* => Ok($name::$variant),)+
          _ => Err(PlatformError::InvalidValue {
            field: $field,
            value: s.to_string(),
            expected: Self::expected(),
          }),
        }
      }
    }
  };
}

vocabulary! {
  /// Operating system
  Os, "os" {
    Linux => "linux",
    Darwin => "darwin" | "macos",
    Windows => "windows",
  }
}

vocabulary! {
  /// CPU architecture
  Arch, "arch" {
    Amd64 => "amd64" | "x86_64",
    Arm64 => "arm64" | "aarch64",
    Arm => "arm",
    X86 => "386" | "x86" | "i686",
  }
}

vocabulary! {
  /// C library implementation
  Libc, "libc" {
    Glibc => "glibc",
    Musl => "musl",
    None => "none",
  }
}

vocabulary! {
  /// Linux distribution family, grouped by package format
  LinuxFamily, "linux_family" {
    Debian => "debian",
    Rhel => "rhel",
    Arch => "arch",
    Alpine => "alpine",
    Suse => "suse",
    None => "none",
  }
}

vocabulary! {
  /// GPU vendor
  Gpu, "gpu" {
    Nvidia => "nvidia",
    Amd => "amd",
    Intel => "intel",
    Apple => "apple",
    None => "none",
  }
}

impl Os {
  /// The operating system this binary was compiled for, if it is one kiln knows.
  pub fn current() -> Option<Self> {
    std::env::consts::OS.parse().ok()
  }

  /// Package manager assumed on this OS when nothing more specific is known.
  pub const fn default_package_manager(&self) -> Option<&'static str> {
    match self {
      Os::Darwin => Some("brew"),
      Os::Linux | Os::Windows => None,
    }
  }
}

impl LinuxFamily {
  /// The distribution package manager of this family.
  pub const fn package_manager(&self) -> Option<&'static str> {
    match self {
      LinuxFamily::Debian => Some("apt"),
      LinuxFamily::Rhel => Some("dnf"),
      LinuxFamily::Arch => Some("pacman"),
      LinuxFamily::Alpine => Some("apk"),
      LinuxFamily::Suse => Some("zypper"),
      LinuxFamily::None => None,
    }
  }
}

fn is_distro_package_manager(pm: &str) -> bool {
  LinuxFamily::ALL.iter().any(|f| f.package_manager() == Some(pm))
}

impl Arch {
  /// The architecture this binary was compiled for, if it is one kiln knows.
  pub fn current() -> Option<Self> {
    std::env::consts::ARCH.parse().ok()
  }
}

/// A target attribute a predicate can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetField {
  /// The `os/arch` tuple.
  Platform,
  Os,
  Arch,
  Libc,
  LinuxFamily,
  Gpu,
  PackageManager,
}

impl TargetField {
  pub const ALL: &'static [TargetField] = &[
    TargetField::Platform,
    TargetField::Os,
    TargetField::Arch,
    TargetField::Libc,
    TargetField::LinuxFamily,
    TargetField::Gpu,
    TargetField::PackageManager,
  ];

  pub const fn as_str(&self) -> &'static str {
    match self {
      TargetField::Platform => "platform",
      TargetField::Os => "os",
      TargetField::Arch => "arch",
      TargetField::Libc => "libc",
      TargetField::LinuxFamily => "linux_family",
      TargetField::Gpu => "gpu",
      TargetField::PackageManager => "package_manager",
    }
  }

  /// Checks that `value` is a legal value for this field.
  ///
  /// Package managers are free-form; every other field has a closed vocabulary.
  pub fn validate(&self, value: &str) -> Result<(), PlatformError> {
    match self {
      TargetField::Platform => {
        let Some((os, arch)) = value.split_once('/') else {
          return Err(PlatformError::InvalidValue {
            field: "platform",
            value: value.to_string(),
            expected: "<os>/<arch>".to_string(),
          });
        };
        os.parse::<Os>()?;
        arch.parse::<Arch>()?;
      }
      TargetField::Os => {
        value.parse::<Os>()?;
      }
      TargetField::Arch => {
        value.parse::<Arch>()?;
      }
      TargetField::Libc => {
        value.parse::<Libc>()?;
      }
      TargetField::LinuxFamily => {
        value.parse::<LinuxFamily>()?;
      }
      TargetField::Gpu => {
        value.parse::<Gpu>()?;
      }
      TargetField::PackageManager => {}
    }
    Ok(())
  }
}

impl fmt::Display for TargetField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// The platform a plan is generated for.
///
/// Every attribute is optional: `None` means detection could not determine it
/// and nobody overrode it. Predicates treat an unknown attribute as a
/// wildcard. A `Target` is never mutated; the `with_*` methods return a
/// modified copy.
///
/// A target whose OS is known not to be Linux has `libc` and `linux_family`
/// set to `none`, like a detected one. Setting those attributes after the OS
/// still replaces them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  os: Option<Os>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  arch: Option<Arch>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  libc: Option<Libc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  linux_family: Option<LinuxFamily>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  gpu: Option<Gpu>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  package_manager: Option<String>,
}

impl Target {
  /// A target with a known OS and architecture and every other attribute unknown.
  pub fn new(os: Os, arch: Arch) -> Self {
    Self::default().with_os(Some(os)).with_arch(Some(arch))
  }

  /// A target about which nothing is known.
  pub fn unknown() -> Self {
    Self::default()
  }

  pub fn os(&self) -> Option<Os> {
    self.os
  }

  pub fn arch(&self) -> Option<Arch> {
    self.arch
  }

  pub fn libc(&self) -> Option<Libc> {
    self.libc
  }

  pub fn linux_family(&self) -> Option<LinuxFamily> {
    self.linux_family
  }

  pub fn gpu(&self) -> Option<Gpu> {
    self.gpu
  }

  pub fn package_manager(&self) -> Option<&str> {
    self.package_manager.as_deref()
  }

  /// Changing the OS also resets the attributes that only exist on Linux.
  pub fn with_os(&self, os: Option<Os>) -> Self {
    let mut target = Self { os, ..self.clone() };
    match os {
      Some(Os::Linux) if self.os.is_some_and(|prev| prev != Os::Linux) => {
        target.libc = None;
        target.linux_family = None;
        if self.package_manager.as_deref() == self.os.and_then(|prev| prev.default_package_manager()) {
          target.package_manager = None;
        }
      }
      Some(os) if os != Os::Linux => {
        target.libc = Some(Libc::None);
        target.linux_family = Some(LinuxFamily::None);
        if target.package_manager.as_deref().is_none_or(is_distro_package_manager) {
          target.package_manager = os.default_package_manager().map(str::to_string);
        }
      }
      _ => {}
    }
    target
  }

  pub fn with_arch(&self, arch: Option<Arch>) -> Self {
    Self { arch, ..self.clone() }
  }

  pub fn with_libc(&self, libc: Option<Libc>) -> Self {
    Self { libc, ..self.clone() }
  }

  pub fn with_linux_family(&self, linux_family: Option<LinuxFamily>) -> Self {
    Self {
      linux_family,
      ..self.clone()
    }
  }

  pub fn with_gpu(&self, gpu: Option<Gpu>) -> Self {
    Self { gpu, ..self.clone() }
  }

  /// Package-manager names are trimmed and lowercased; an empty name is unknown.
  pub fn with_package_manager(&self, package_manager: Option<&str>) -> Self {
    Self {
      package_manager: package_manager
        .map(str::trim)
        .filter(|pm| !pm.is_empty())
        .map(str::to_ascii_lowercase),
      ..self.clone()
    }
  }

  /// Returns the `os/arch` tuple, known only when both halves are.
  pub fn platform(&self) -> Option<String> {
    match (self.os, self.arch) {
      (Some(os), Some(arch)) => Some(format!("{}/{}", os, arch)),
      _ => None,
    }
  }

  /// Returns the value of `field` as a predicate would see it, or `None` if unknown.
  pub fn attribute(&self, field: TargetField) -> Option<String> {
    match field {
      TargetField::Platform => self.platform(),
      TargetField::Os => self.os.map(|v| v.as_str().to_string()),
      TargetField::Arch => self.arch.map(|v| v.as_str().to_string()),
      TargetField::Libc => self.libc.map(|v| v.as_str().to_string()),
      TargetField::LinuxFamily => self.linux_family.map(|v| v.as_str().to_string()),
      TargetField::Gpu => self.gpu.map(|v| v.as_str().to_string()),
      TargetField::PackageManager => self.package_manager.clone(),
    }
  }

  /// Whether two targets agree on every one of `fields`.
  ///
  /// Plans generated for targets that agree on every field some predicate
  /// reads are interchangeable.
  pub fn agrees_on(&self, other: &Target, fields: &[TargetField]) -> bool {
    fields.iter().all(|f| self.attribute(*f) == other.attribute(*f))
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for field in TargetField::ALL.iter().filter(|f| **f != TargetField::Platform) {
      let value = self.attribute(*field).unwrap_or_else(|| "?".to_string());
      if !first {
        write!(f, " ")?;
      }
      write!(f, "{}={}", field, value)?;
      first = false;
    }
    Ok(())
  }
}
