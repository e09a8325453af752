//! Caller-forced target attributes.

use tracing::debug;

use crate::error::PlatformError;
use crate::target::{Arch, Gpu, Libc, LinuxFamily, Os, Target};

/// Environment variables read by [`TargetOverrides::from_env`].
pub const ENV_OS: &str = "KILN_OS";
pub const ENV_ARCH: &str = "KILN_ARCH";
pub const ENV_LIBC: &str = "KILN_LIBC";
pub const ENV_LINUX_FAMILY: &str = "KILN_LINUX_FAMILY";
pub const ENV_GPU: &str = "KILN_GPU";
pub const ENV_PACKAGE_MANAGER: &str = "KILN_PACKAGE_MANAGER";

/// Attribute values that replace detected ones.
///
/// Values are kept as strings until [`apply`](Self::apply) so that a bad
/// value is reported with the field it was meant for. An overridden value is
/// indistinguishable from a detected one once applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOverrides {
  pub os: Option<String>,
  pub arch: Option<String>,
  pub libc: Option<String>,
  pub linux_family: Option<String>,
  pub gpu: Option<String>,
  pub package_manager: Option<String>,
}

impl TargetOverrides {
  /// Read overrides from `KILN_*` environment variables. Empty variables are ignored.
  pub fn from_env() -> Self {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    Self {
      os: var(ENV_OS),
      arch: var(ENV_ARCH),
      libc: var(ENV_LIBC),
      linux_family: var(ENV_LINUX_FAMILY),
      gpu: var(ENV_GPU),
      package_manager: var(ENV_PACKAGE_MANAGER),
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  /// Returns a copy of `target` with every set override applied.
  ///
  /// The OS is applied first, so an OS override drops detected Linux-only
  /// attributes unless they are overridden too.
  pub fn apply(&self, target: &Target) -> Result<Target, PlatformError> {
    let mut result = target.clone();

    if let Some(os) = &self.os {
      result = result.with_os(Some(os.parse::<Os>()?));
    }
    if let Some(arch) = &self.arch {
      result = result.with_arch(Some(arch.parse::<Arch>()?));
    }
    if let Some(libc) = &self.libc {
      result = result.with_libc(Some(libc.parse::<Libc>()?));
    }
    if let Some(family) = &self.linux_family {
      result = result.with_linux_family(Some(family.parse::<LinuxFamily>()?));
    }
    if let Some(gpu) = &self.gpu {
      result = result.with_gpu(Some(gpu.parse::<Gpu>()?));
    }
    if let Some(pm) = &self.package_manager {
      result = result.with_package_manager(Some(pm.trim()));
    }

    if !self.is_empty() {
      debug!(before = %target, after = %result, "applied target overrides");
    }
    Ok(result)
  }
}
