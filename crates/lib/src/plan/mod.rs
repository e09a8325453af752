//! Plans: generation, comparison, golden files and batches.
//!
//! A [`Plan`] is generated by [`PlanGenerator::generate`] from a root recipe
//! and a target. It can be stored as a golden file and later compared with a
//! freshly generated plan using [`compare`].

mod batch;
mod compare;
mod generate;
mod golden;
mod pin;
mod template;
mod types;

pub use batch::{BatchConfig, BatchOutcome, generate_batch};
pub use compare::{CompareError, Comparison, Difference, PlanDiff, SchemaStep, StructuralSchema, compare};
pub use generate::{GenerateError, PlanGenerator, PlanOptions};
pub use golden::{GoldenError, check_golden, golden_path, read_plan, write_plan};
pub use pin::PinSet;
pub use template::{TemplateVars, expand_params};
pub use types::{Plan, PlanFormatError, ResolvedStep};
