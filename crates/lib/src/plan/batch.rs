//! Generating plans for many tools at once.
//!
//! Every (tool, target) generation runs on its own task. The only state the
//! tasks share is the generator's loader, so one failure never affects
//! another. Concurrency is bounded by a semaphore.

use std::sync::Arc;

use kiln_platform::Target;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::generate::{GenerateError, PlanGenerator, PlanOptions};
use super::types::Plan;

#[derive(Debug, Clone)]
pub struct BatchConfig {
  /// Maximum number of plans generated at the same time.
  pub parallelism: usize,
}

impl Default for BatchConfig {
  fn default() -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
    }
  }
}

/// Result of one tool in a batch.
#[derive(Debug)]
pub struct BatchOutcome {
  pub tool: String,
  pub result: Result<Plan, GenerateError>,
}

impl BatchOutcome {
  pub fn is_ok(&self) -> bool {
    self.result.is_ok()
  }
}

/// Generate a plan for each of `tools`. Outcomes are returned in input order.
///
/// `options.version` applies to every tool; it is normally left unset for
/// batches.
pub async fn generate_batch(
  generator: Arc<PlanGenerator>,
  tools: &[String],
  target: &Target,
  options: &PlanOptions,
  config: &BatchConfig,
) -> Vec<BatchOutcome> {
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut join_set = JoinSet::new();

  for (index, tool) in tools.iter().enumerate() {
    let generator = Arc::clone(&generator);
    let semaphore = Arc::clone(&semaphore);
    let tool = tool.clone();
    let target = target.clone();
    let options = options.clone();

    join_set.spawn(async move {
      let result = match semaphore.acquire_owned().await {
        Ok(_permit) => generator.generate(&tool, &target, &options).await,
        Err(e) => Err(GenerateError::Task { message: e.to_string() }),
      };
      (index, result)
    });
  }

  let mut results: Vec<Option<Result<Plan, GenerateError>>> = tools.iter().map(|_| None).collect();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok((index, result)) => results[index] = Some(result),
      Err(e) => warn!(error = %e, "plan generation task panicked"),
    }
  }

  let outcomes: Vec<BatchOutcome> = tools
    .iter()
    .zip(results)
    .map(|(tool, result)| BatchOutcome {
      tool: tool.clone(),
      result: result.unwrap_or_else(|| {
        Err(GenerateError::Task {
          message: "task did not complete".to_string(),
        })
      }),
    })
    .collect();

  debug!(
    total = outcomes.len(),
    failed = outcomes.iter().filter(|o| !o.is_ok()).count(),
    "batch complete"
  );
  outcomes
}
