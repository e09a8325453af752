use std::fs;

use kiln_lib::action::ActionRegistry;
use kiln_lib::plan::{
  CompareError, GoldenError, PlanFormatError, PlanOptions, check_golden, golden_path, read_plan, write_plan,
};
use kiln_lib::version::StaticVersionResolver;
use kiln_platform::Gpu;
use tempfile::TempDir;

use super::common::{RecipeDir, gpu_viewer, musl_nvidia};

#[tokio::test]
async fn written_plan_checks_clean() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let golden = TempDir::new().unwrap();
  let registry = ActionRegistry::builtin();

  let plan = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  let path = write_plan(golden.path(), &plan).unwrap();

  assert_eq!(path, golden.path().join("v/viewer/v2.4.0-linux-amd64-alpine.json"));
  assert_eq!(read_plan(&path).unwrap(), plan);
  check_golden(golden.path(), &plan, &registry).unwrap();

  let regenerated = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  check_golden(golden.path(), &regenerated, &registry).unwrap();
}

#[tokio::test]
async fn drift_is_reported_until_regenerated() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let golden = TempDir::new().unwrap();
  let registry = ActionRegistry::builtin();

  let plan = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  write_plan(golden.path(), &plan).unwrap();

  let drifted = dir
    .generator_with(StaticVersionResolver::new().with_version("vulkan-loader", "1.3.290"))
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  let err = check_golden(golden.path(), &drifted, &registry).unwrap_err();
  match err {
    GoldenError::Compare(CompareError::Mismatch { diff }) => assert!(diff.touches("/dependencies/0/version")),
    other => panic!("expected a mismatch, got {other:?}"),
  }

  write_plan(golden.path(), &drifted).unwrap();
  check_golden(golden.path(), &drifted, &registry).unwrap();
  assert!(!golden_path(golden.path(), &drifted).with_extension("json.tmp").exists());
}

#[tokio::test]
async fn missing_golden_is_distinct_from_a_mismatch() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let golden = TempDir::new().unwrap();

  let plan = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  let err = check_golden(golden.path(), &plan, &ActionRegistry::builtin()).unwrap_err();
  assert!(matches!(err, GoldenError::Missing { .. }), "{err:?}");
}

#[tokio::test]
async fn golden_for_another_gpu_is_refused() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let golden = TempDir::new().unwrap();
  let generator = dir.generator();

  let nvidia = generator
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  write_plan(golden.path(), &nvidia).unwrap();

  let amd = generator
    .generate("viewer", &musl_nvidia().with_gpu(Some(Gpu::Amd)), &PlanOptions::default())
    .await
    .unwrap();
  assert_eq!(golden_path(golden.path(), &amd), golden_path(golden.path(), &nvidia));

  let err = check_golden(golden.path(), &amd, &ActionRegistry::builtin()).unwrap_err();
  assert!(matches!(err, GoldenError::PlatformMismatch { .. }), "{err:?}");
}

#[tokio::test]
async fn unreadable_golden_is_a_format_error() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let golden = TempDir::new().unwrap();

  let plan = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  let path = write_plan(golden.path(), &plan).unwrap();

  let future = plan.to_json().unwrap().replacen("\"format_version\": 1", "\"format_version\": 99", 1);
  fs::write(&path, future).unwrap();
  let err = read_plan(&path).unwrap_err();
  assert!(
    matches!(
      err,
      GoldenError::Format {
        source: PlanFormatError::UnsupportedVersion { found: 99, .. },
        ..
      }
    ),
    "{err:?}"
  );

  fs::write(&path, "{ not json").unwrap();
  assert!(matches!(
    read_plan(&path).unwrap_err(),
    GoldenError::Format {
      source: PlanFormatError::Parse(_),
      ..
    }
  ));
}
