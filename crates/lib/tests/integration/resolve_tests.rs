use std::sync::Arc;
use std::time::Duration;

use kiln_lib::action::ActionRegistry;
use kiln_lib::context::ResolveContext;
use kiln_lib::predicate::UnknownAttributePolicy;
use kiln_lib::recipe::{DirLoader, RecipeLoader};
use kiln_lib::resolve::{ResolveError, ResolveOptions, resolve_transitive};
use kiln_platform::{Gpu, Target};

use super::common::{RecipeDir, SlowLoader, debian, gpu_viewer, musl_nvidia};

async fn resolve(dir: &RecipeDir, root: &str, target: &Target) -> Result<Vec<String>, ResolveError> {
  resolve_transitive(
    root,
    target,
    &ResolveOptions::default(),
    &ActionRegistry::builtin(),
    &dir.loader(),
  )
  .await
  .map(|r| r.order().to_vec())
}

#[tokio::test]
async fn gpu_target_pulls_in_vulkan_loader() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let order = resolve(&dir, "viewer", &musl_nvidia()).await.unwrap();
  assert_eq!(order, ["vulkan-loader", "viewer"]);

  let cpu_only = musl_nvidia().with_gpu(Some(Gpu::None));
  let order = resolve(&dir, "viewer", &cpu_only).await.unwrap();
  assert_eq!(order, ["viewer"]);
}

#[tokio::test]
async fn unknown_gpu_is_wildcard_pass_unless_excluded() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let unknown_gpu = musl_nvidia().with_gpu(None);

  let order = resolve(&dir, "viewer", &unknown_gpu).await.unwrap();
  assert_eq!(order, ["vulkan-loader", "viewer"]);

  let options = ResolveOptions {
    policy: UnknownAttributePolicy::Exclude,
    ..Default::default()
  };
  let resolution = resolve_transitive("viewer", &unknown_gpu, &options, &ActionRegistry::builtin(), &dir.loader())
    .await
    .unwrap();
  assert_eq!(resolution.order(), ["viewer"]);
}

#[tokio::test]
async fn cycle_across_files_is_reported() {
  let dir = RecipeDir::new();
  dir
    .recipe(
      "alpha",
      "[[steps]]\naction = \"chmod\"\nfiles = [\"a\"]\ndependencies = [\"beta\"]\n",
    )
    .recipe(
      "beta",
      "[[steps]]\naction = \"chmod\"\nfiles = [\"b\"]\ndependencies = [\"alpha\"]\n",
    );

  let err = resolve(&dir, "alpha", &debian()).await.unwrap_err();
  let ResolveError::Cycle { path } = err else {
    panic!("expected a cycle, got {err:?}");
  };
  assert!(path.contains(&"alpha".to_string()));
  assert!(path.contains(&"beta".to_string()));
}

#[tokio::test]
async fn ecosystem_runtime_is_an_implicit_dependency() {
  let dir = RecipeDir::new();
  dir
    .recipe(
      "black",
      "[version]\nfixed = \"24.4.2\"\n\n[[steps]]\naction = \"pipx_install\"\npackage = \"black\"\n",
    )
    .recipe(
      "python",
      "[version]\nfixed = \"3.12.3\"\n\n[[steps]]\naction = \"download_archive\"\nurl = \"https://example.com/python-{version}.tar.gz\"\nbinaries = [\"bin/python3\"]\n",
    );

  assert_eq!(resolve(&dir, "black", &debian()).await.unwrap(), ["python", "black"]);
}

#[tokio::test]
async fn repeated_resolution_is_stable() {
  let dir = RecipeDir::new();
  for (name, deps) in [
    ("app", "[\"net\", \"db\", \"log\"]"),
    ("net", "[\"tls\", \"log\"]"),
    ("db", "[\"tls\"]"),
    ("tls", "[]"),
    ("log", "[]"),
  ] {
    dir.recipe(
      name,
      &format!("[[steps]]\naction = \"chmod\"\nfiles = [\"x\"]\ndependencies = {}\n", deps),
    );
  }

  let first = resolve(&dir, "app", &debian()).await.unwrap();
  assert_eq!(first.last().map(String::as_str), Some("app"));
  let pos = |n: &str| first.iter().position(|x| x == n).unwrap();
  assert!(pos("tls") < pos("db") && pos("tls") < pos("net") && pos("log") < pos("net"));

  for _ in 0..5 {
    assert_eq!(resolve(&dir, "app", &debian()).await.unwrap(), first);
  }
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_slow_loads() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let loader: Arc<dyn RecipeLoader> = Arc::new(SlowLoader {
    inner: DirLoader::new(dir.path()),
    delay: Duration::from_secs(30),
  });
  let options = ResolveOptions {
    context: ResolveContext::new().with_timeout(Duration::from_secs(5)),
    ..Default::default()
  };

  let err = resolve_transitive("viewer", &musl_nvidia(), &options, &ActionRegistry::builtin(), &loader)
    .await
    .unwrap_err();
  assert!(matches!(err, ResolveError::TimedOut), "{err:?}");
}
