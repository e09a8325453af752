//! Shared helpers for kiln-lib integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kiln_lib::action::ActionRegistry;
use kiln_lib::plan::PlanGenerator;
use kiln_lib::recipe::{CachedLoader, DirLoader, LoadError, Recipe, RecipeLoader};
use kiln_lib::version::StaticVersionResolver;
use kiln_platform::{Arch, Gpu, Libc, LinuxFamily, Os, Target};
use tempfile::TempDir;

/// A recipe directory in the registry layout (`<letter>/<name>.toml`).
pub struct RecipeDir {
  pub temp: TempDir,
}

impl RecipeDir {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// Write a recipe. `body` is everything after the `[metadata]` table.
  pub fn recipe(&self, name: &str, body: &str) -> &Self {
    let letter = name.chars().next().unwrap().to_string();
    let dir = self.temp.path().join(letter);
    std::fs::create_dir_all(&dir).unwrap();
    let content = format!("[metadata]\nname = \"{}\"\n\n{}", name, body);
    std::fs::write(dir.join(format!("{}.toml", name)), content).unwrap();
    self
  }

  pub fn loader(&self) -> Arc<dyn RecipeLoader> {
    Arc::new(CachedLoader::new(DirLoader::new(self.path())))
  }

  pub fn generator(&self) -> PlanGenerator {
    self.generator_with(StaticVersionResolver::new())
  }

  pub fn generator_with(&self, versions: StaticVersionResolver) -> PlanGenerator {
    PlanGenerator::new(self.loader(), Arc::new(ActionRegistry::builtin()), Arc::new(versions))
  }
}

/// Writes the GPU viewer scenario: a GPU build depending on `vulkan-loader`
/// and a CPU fallback.
pub fn gpu_viewer(dir: &RecipeDir) {
  dir
    .recipe(
      "viewer",
      r#"
[version]
fixed = "2.4.0"

[[steps]]
action = "github_archive"
repo = "example/viewer"
asset_pattern = "viewer-{version}-{os}-{arch}-gpu.tar.gz"
binaries = ["viewer"]
when = { os = "linux", gpu = ["nvidia", "amd", "intel"] }
dependencies = ["vulkan-loader"]

[[steps]]
action = "github_archive"
repo = "example/viewer"
asset_pattern = "viewer-{version}-{os}-{arch}-cpu.tar.gz"
binaries = ["viewer"]
when = { gpu = "none" }
"#,
    )
    .recipe(
      "vulkan-loader",
      r#"
[version]
fixed = "1.3.280"
tag_prefix = "sdk-"

[[steps]]
action = "download_archive"
url = "https://example.com/vulkan-loader-{version}-{libc}.tar.gz"
checksum = "sha256:5c1a"
binaries = ["lib/libvulkan.so.1"]
"#,
    );
}

pub fn musl_nvidia() -> Target {
  Target::new(Os::Linux, Arch::Amd64)
    .with_libc(Some(Libc::Musl))
    .with_linux_family(Some(LinuxFamily::Alpine))
    .with_gpu(Some(Gpu::Nvidia))
}

pub fn debian() -> Target {
  Target::new(Os::Linux, Arch::Amd64)
    .with_libc(Some(Libc::Glibc))
    .with_linux_family(Some(LinuxFamily::Debian))
}

/// Wraps a loader and delays every load.
pub struct SlowLoader<L> {
  pub inner: L,
  pub delay: Duration,
}

#[async_trait]
impl<L: RecipeLoader> RecipeLoader for SlowLoader<L> {
  async fn load(&self, name: &str) -> Result<Arc<Recipe>, LoadError> {
    tokio::time::sleep(self.delay).await;
    self.inner.load(name).await
  }
}
