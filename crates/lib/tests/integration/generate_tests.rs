use std::sync::Arc;
use std::time::Duration;

use kiln_lib::action::ActionRegistry;
use kiln_lib::context::ResolveContext;
use kiln_lib::plan::{BatchConfig, GenerateError, PlanGenerator, PlanOptions, generate_batch};
use kiln_lib::predicate::UnknownAttributePolicy;
use kiln_lib::recipe::{DirLoader, SelectError};
use kiln_lib::resolve::ResolveError;
use kiln_lib::version::StaticVersionResolver;
use kiln_platform::{Gpu, TargetField, TargetOverrides};
use serde_json::json;

use super::common::{RecipeDir, SlowLoader, debian, gpu_viewer, musl_nvidia};

fn actions(plan: &kiln_lib::plan::Plan) -> Vec<&str> {
  plan.steps.iter().map(|s| s.action.as_str()).collect()
}

#[tokio::test]
async fn gpu_build_brings_its_loader() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let plan = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();

  assert_eq!(plan.tool, "viewer");
  assert_eq!(plan.version, "2.4.0");
  assert!(plan.deterministic);
  assert_eq!(actions(&plan), ["download_file", "extract", "chmod", "install_binaries"]);
  assert_eq!(
    plan.steps[0].url.as_deref(),
    Some("https://github.com/example/viewer/releases/download/v2.4.0/viewer-2.4.0-linux-amd64-gpu.tar.gz")
  );

  assert_eq!(plan.dependencies.len(), 1);
  let loader = &plan.dependencies[0];
  assert_eq!(loader.tool, "vulkan-loader");
  assert_eq!(loader.version, "1.3.280");
  assert_eq!(
    loader.steps[0].url.as_deref(),
    Some("https://example.com/vulkan-loader-1.3.280-musl.tar.gz")
  );
  assert_eq!(loader.steps[0].checksum.as_deref(), Some("sha256:5c1a"));
  assert_eq!(loader.steps[3].params["binaries"], json!(["lib/libvulkan.so.1"]));

  let all: Vec<&str> = plan.all_steps().iter().map(|s| s.action.as_str()).collect();
  assert_eq!(all.len(), 8);
}

#[tokio::test]
async fn cpu_target_gets_the_fallback_only() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let plan = dir
    .generator()
    .generate("viewer", &debian().with_gpu(Some(Gpu::None)), &PlanOptions::default())
    .await
    .unwrap();

  assert!(plan.dependencies.is_empty());
  assert_eq!(plan.steps[0].params["dest"], json!("viewer-2.4.0-linux-amd64-cpu.tar.gz"));
}

#[tokio::test]
async fn overrides_steer_selection() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let overrides = TargetOverrides {
    gpu: Some("none".to_string()),
    ..Default::default()
  };
  let target = overrides.apply(&musl_nvidia()).unwrap();
  let plan = dir
    .generator()
    .generate("viewer", &target, &PlanOptions::default())
    .await
    .unwrap();

  assert!(plan.dependencies.is_empty());
  assert_eq!(plan.platform.gpu(), Some(Gpu::None));
}

#[tokio::test]
async fn system_packages_follow_the_target_os() {
  let dir = RecipeDir::new();
  dir.recipe(
    "curl",
    r#"
[version]
fixed = "8.8.0"

[[steps]]
action = "apt_install"
packages = ["curl"]

[[steps]]
action = "brew_install"
packages = ["curl"]
"#,
  );
  let generator = dir.generator();

  let on_debian = generator
    .generate("curl", &debian(), &PlanOptions::default())
    .await
    .unwrap();
  assert_eq!(actions(&on_debian), ["apt_install"]);

  let overridden = TargetOverrides {
    os: Some("darwin".to_string()),
    ..Default::default()
  }
  .apply(&debian())
  .unwrap();
  let constructed = kiln_platform::Target::new(kiln_platform::Os::Darwin, kiln_platform::Arch::Amd64);
  for mac in [overridden, constructed] {
    let plan = generator.generate("curl", &mac, &PlanOptions::default()).await.unwrap();
    assert_eq!(actions(&plan), ["brew_install"], "{mac}");
  }

  let shouting = TargetOverrides {
    package_manager: Some("APT".to_string()),
    ..Default::default()
  }
  .apply(&debian())
  .unwrap();
  assert_eq!(shouting.package_manager(), Some("apt"));
}

#[tokio::test]
async fn unknown_gpu_follows_the_policy() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let generator = dir.generator();
  let target = musl_nvidia().with_gpu(None);

  // Both steps only constrain the GPU beyond what the target knows.
  let included = generator
    .generate("viewer", &target, &PlanOptions::default())
    .await
    .unwrap();
  assert_eq!(included.dependencies.len(), 1);
  assert_eq!(included.steps.len(), 8);
  assert!(included.steps[0].params["dest"].as_str().unwrap().ends_with("-gpu.tar.gz"));
  assert!(included.steps[4].params["dest"].as_str().unwrap().ends_with("-cpu.tar.gz"));

  let options = PlanOptions {
    unknown_attributes: UnknownAttributePolicy::Exclude,
    ..Default::default()
  };
  let excluded = generator.generate("viewer", &target, &options).await.unwrap();
  assert!(excluded.dependencies.is_empty());
  assert!(excluded.steps.is_empty());

  let options = PlanOptions {
    unknown_attributes: UnknownAttributePolicy::Reject,
    ..Default::default()
  };
  let err = generator.generate("viewer", &target, &options).await.unwrap_err();
  match err {
    GenerateError::Resolve(ResolveError::Selection(SelectError::AmbiguousTarget { recipe, fields, .. })) => {
      assert_eq!(recipe, "viewer");
      assert_eq!(fields, [TargetField::Gpu]);
    }
    other => panic!("expected an ambiguous target, got {other:?}"),
  }
}

#[tokio::test]
async fn non_deterministic_step_taints_every_ancestor() {
  let dir = RecipeDir::new();
  dir
    .recipe(
      "site",
      "[version]\nfixed = \"1.0.0\"\n\n[[steps]]\naction = \"chmod\"\nfiles = [\"site\"]\ndependencies = [\"linter\"]\n",
    )
    .recipe(
      "linter",
      "[version]\nfixed = \"9.1.0\"\n\n[[steps]]\naction = \"npm_install\"\npackage = \"eslint\"\n",
    )
    .recipe(
      "nodejs",
      "[version]\nfixed = \"20.12.0\"\n\n[[steps]]\naction = \"download_archive\"\nurl = \"https://example.com/node-{version}.tar.xz\"\nbinaries = [\"bin/node\"]\n",
    );

  let plan = dir
    .generator()
    .generate("site", &debian(), &PlanOptions::default())
    .await
    .unwrap();

  assert!(plan.steps.iter().all(|s| s.deterministic));
  assert!(!plan.deterministic);

  let linter = &plan.dependencies[0];
  assert_eq!(linter.tool, "linter");
  assert!(!linter.deterministic);
  assert_eq!(actions(linter), ["npm_exec"]);
  assert_eq!(linter.steps[0].params["package"], json!("eslint"));
  assert_eq!(linter.steps[0].params["version"], json!("9.1.0"));

  let node = &linter.dependencies[0];
  assert_eq!(node.tool, "nodejs");
  assert!(node.deterministic);
  assert!(!node.steps[0].params.contains_key("format"));
  assert_eq!(node.steps[1].params["format"], json!("tar.xz"));
}

#[tokio::test]
async fn pinned_versions_reproduce_the_plan() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let bumped = StaticVersionResolver::new().with_version("vulkan-loader", "1.3.290");
  let first = dir
    .generator_with(bumped)
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  assert_eq!(first.dependencies[0].version, "1.3.290");

  let options = PlanOptions {
    pin_from: Some(kiln_lib::plan::PinSet::from_plan(&first)),
    ..Default::default()
  };
  let again = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &options)
    .await
    .unwrap();
  assert_eq!(again, first);
  assert_eq!(again.to_json().unwrap(), first.to_json().unwrap());
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_the_whole_generation() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let generator = PlanGenerator::new(
    Arc::new(SlowLoader {
      inner: DirLoader::new(dir.path()),
      delay: Duration::from_secs(60),
    }),
    Arc::new(ActionRegistry::builtin()),
    Arc::new(StaticVersionResolver::new()),
  );
  let options = PlanOptions {
    context: ResolveContext::new().with_timeout(Duration::from_secs(10)),
    ..Default::default()
  };

  let err = generator
    .generate("viewer", &musl_nvidia(), &options)
    .await
    .unwrap_err();
  assert!(matches!(err, GenerateError::TimedOut), "{err:?}");
}

#[tokio::test]
async fn cancelling_before_start_is_reported() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let options = PlanOptions::default();
  options.context.cancel();
  let err = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &options)
    .await
    .unwrap_err();
  assert!(matches!(err, GenerateError::Cancelled));
}

#[tokio::test]
async fn batch_isolates_failures_and_keeps_order() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  dir.recipe(
    "broken",
    "[version]\nfixed = \"1.0.0\"\n\n[[steps]]\naction = \"chmod\"\nfiles = [\"x\"]\ndependencies = [\"ghost\"]\n",
  );

  let tools: Vec<String> = ["viewer", "broken", "vulkan-loader", "missing"]
    .into_iter()
    .map(String::from)
    .collect();
  let outcomes = generate_batch(
    Arc::new(dir.generator()),
    &tools,
    &musl_nvidia(),
    &PlanOptions::default(),
    &BatchConfig { parallelism: 2 },
  )
  .await;

  let names: Vec<&str> = outcomes.iter().map(|o| o.tool.as_str()).collect();
  assert_eq!(names, ["viewer", "broken", "vulkan-loader", "missing"]);
  assert!(outcomes[0].is_ok());
  assert!(outcomes[2].is_ok());

  match &outcomes[1].result {
    Err(GenerateError::Resolve(ResolveError::RecipeNotFound { name, required_by })) => {
      assert_eq!(name, "ghost");
      assert_eq!(required_by.as_deref(), Some("broken"));
    }
    other => panic!("unexpected outcome: {other:?}"),
  }
  assert!(matches!(
    &outcomes[3].result,
    Err(GenerateError::Resolve(ResolveError::RecipeNotFound { required_by: None, .. }))
  ));
}
