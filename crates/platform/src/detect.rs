//! Best-effort detection of the running host.
//!
//! Detection never fails: an attribute that cannot be determined stays unknown,
//! and unknown attributes act as wildcards during predicate matching.

use std::path::Path;

use tracing::{debug, trace};

use crate::os_release::OsRelease;
use crate::target::{Arch, Gpu, Libc, LinuxFamily, Os, Target};

impl Target {
  /// Detect the running host.
  pub fn detect() -> Self {
    Self::detect_with_root(Path::new("/"))
  }

  /// Detect the running host, reading Linux system files relative to `root`.
  pub fn detect_with_root(root: &Path) -> Self {
    let os = Os::current();
    let arch = Arch::current();
    let target = Target::unknown().with_os(os).with_arch(arch);

    let target = match os {
      Some(Os::Linux) => detect_linux(target, root),
      Some(Os::Darwin) => target.with_gpu((arch == Some(Arch::Arm64)).then_some(Gpu::Apple)),
      Some(Os::Windows) => target.with_gpu(Some(Gpu::None)),
      None => target,
    };

    debug!(host = %target, "detected target");
    target
  }
}

fn detect_linux(target: Target, root: &Path) -> Target {
  let family = match OsRelease::read(&root.join("etc/os-release")) {
    Ok(release) => match release.family() {
      Ok(family) => Some(family),
      Err(e) => {
        debug!(error = %e, "could not map distribution to a family");
        None
      }
    },
    Err(e) => {
      debug!(error = %e, "no os-release");
      None
    }
  };

  let libc = if family == Some(LinuxFamily::Alpine) || has_musl_loader(root) {
    Libc::Musl
  } else {
    Libc::Glibc
  };

  target
    .with_linux_family(family)
    .with_libc(Some(libc))
    .with_package_manager(family.and_then(|f| f.package_manager()))
}

fn has_musl_loader(root: &Path) -> bool {
  let Ok(entries) = std::fs::read_dir(root.join("lib")) else {
    return false;
  };
  let found = entries
    .flatten()
    .any(|e| e.file_name().to_string_lossy().starts_with("ld-musl-"));
  trace!(found, "checked for musl loader");
  found
}
