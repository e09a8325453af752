use kiln_lib::action::ActionRegistry;
use kiln_lib::plan::{CompareError, Comparison, PlanOptions, StructuralSchema, compare};
use kiln_lib::version::StaticVersionResolver;
use serde_json::json;

use super::common::{RecipeDir, debian, gpu_viewer, musl_nvidia};

fn npm_tool(dir: &RecipeDir) {
  dir
    .recipe(
      "linter",
      "[version]\nfixed = \"9.1.0\"\n\n[[steps]]\naction = \"npm_install\"\npackage = \"eslint\"\n",
    )
    .recipe(
      "nodejs",
      "[version]\nfixed = \"20.12.0\"\n\n[[steps]]\naction = \"download_archive\"\nurl = \"https://example.com/node-{version}.tar.xz\"\nbinaries = [\"bin/node\"]\n",
    );
}

#[tokio::test]
async fn regenerated_plan_equals_itself() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let generator = dir.generator();
  let registry = ActionRegistry::builtin();

  let first = generator
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  let second = generator
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();

  assert_eq!(compare(&first, &first, &registry).unwrap(), Comparison::Equal);
  assert_eq!(compare(&first, &second, &registry).unwrap(), Comparison::Equal);
}

#[tokio::test]
async fn dependency_bump_is_a_mismatch() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let reference = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  let candidate = dir
    .generator_with(StaticVersionResolver::new().with_version("vulkan-loader", "1.3.290"))
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();

  let Comparison::Mismatch(diff) = compare(&reference, &candidate, &ActionRegistry::builtin()).unwrap() else {
    panic!("expected a mismatch");
  };
  assert!(diff.touches("/dependencies/0/version"));
  assert!(diff.touches("/dependencies/0/steps/0/url"));
  assert!(!diff.touches("/steps"));
  assert!(diff.to_string().contains("\"1.3.280\" -> \"1.3.290\""));
}

#[tokio::test]
async fn install_time_evaluation_changes_determinism() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);
  let generator = dir.generator();

  let reference = generator
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  let options = PlanOptions {
    evaluate_at_install: true,
    ..Default::default()
  };
  let candidate = generator.generate("viewer", &musl_nvidia(), &options).await.unwrap();

  let comparison = compare(&reference, &candidate, &ActionRegistry::builtin()).unwrap();
  assert_eq!(
    comparison,
    Comparison::DeterminismChanged {
      reference: true,
      candidate: false
    }
  );
  assert!(matches!(
    comparison.into_result(),
    Err(CompareError::DeterminismChanged {
      reference: true,
      candidate: false
    })
  ));
}

#[tokio::test]
async fn non_deterministic_plans_compare_structurally() {
  let dir = RecipeDir::new();
  npm_tool(&dir);
  let registry = ActionRegistry::builtin();

  let reference = dir
    .generator()
    .generate("linter", &debian(), &PlanOptions::default())
    .await
    .unwrap();
  assert!(!reference.deterministic);

  let mut tolerated = reference.clone();
  tolerated.steps[0]
    .params
    .insert("cache_dir".to_string(), json!("/tmp/npm-cache"));
  assert!(compare(&reference, &tolerated, &registry).unwrap().is_equal());

  let mut swapped = reference.clone();
  swapped.steps[0].params.insert("package".to_string(), json!("eslint-fork"));
  let Comparison::Mismatch(diff) = compare(&reference, &swapped, &registry).unwrap() else {
    panic!("expected a mismatch");
  };
  assert_eq!(diff.len(), 1);
  assert_eq!(diff.differences[0].path, "/steps/0/params/package");
}

#[tokio::test]
async fn deterministic_plans_compare_every_byte() {
  let dir = RecipeDir::new();
  gpu_viewer(&dir);

  let reference = dir
    .generator()
    .generate("viewer", &musl_nvidia(), &PlanOptions::default())
    .await
    .unwrap();
  let mut candidate = reference.clone();
  candidate.steps[0].size = Some(4096);

  let Comparison::Mismatch(diff) = compare(&reference, &candidate, &ActionRegistry::builtin()).unwrap() else {
    panic!("expected a mismatch");
  };
  assert_eq!(diff.differences[0].path, "/steps/0/size");
  assert_eq!(diff.differences[0].reference, None);
  assert_eq!(diff.differences[0].candidate, Some(json!(4096)));
}

#[tokio::test]
async fn schema_keeps_only_allow_listed_params() {
  let dir = RecipeDir::new();
  npm_tool(&dir);

  let plan = dir
    .generator()
    .generate("linter", &debian(), &PlanOptions::default())
    .await
    .unwrap();
  let schema = StructuralSchema::extract(&plan, &ActionRegistry::builtin()).unwrap();

  let keys: Vec<&str> = schema.steps[0].params.keys().map(String::as_str).collect();
  assert_eq!(keys, ["executables", "package", "version"]);
  assert_eq!(schema.dependencies[0].tool, "nodejs");
  assert_eq!(schema.dependencies[0].steps[0].params.keys().collect::<Vec<_>>(), ["dest"]);
}
