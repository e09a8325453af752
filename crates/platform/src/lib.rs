//! Target platform model for kiln.
//!
//! This crate describes the machine a plan is generated for:
//! - `Target`: operating system, architecture, libc, distribution family, GPU vendor
//!   and package-manager hint, each possibly unknown
//! - `Target::detect()`: best-effort detection of the running host
//! - `TargetOverrides`: caller-forced attribute values, applied after detection

mod detect;
mod error;
mod os_release;
mod overrides;
mod target;

pub use error::PlatformError;
pub use os_release::{OsRelease, map_distro_to_family};
pub use overrides::{
  ENV_ARCH, ENV_GPU, ENV_LIBC, ENV_LINUX_FAMILY, ENV_OS, ENV_PACKAGE_MANAGER, TargetOverrides,
};
pub use target::{Arch, Gpu, Libc, LinuxFamily, Os, Target, TargetField};
