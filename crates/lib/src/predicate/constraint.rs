//! Conjunctions of predicates.

use kiln_platform::Target;

use super::{Evaluation, Predicate};

/// Several predicates that must all hold.
///
/// Merging two predicates never unions their value lists: `{gpu: [nvidia]}`
/// and `{gpu: [amd]}` together admit no target with a known GPU, even though
/// either alone admits one. Each member is evaluated independently and the
/// outcomes are combined with [`Evaluation::and`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraint {
  parts: Vec<Predicate>,
}

impl Constraint {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn and(mut self, predicate: Predicate) -> Self {
    if !predicate.is_empty() {
      self.parts.push(predicate);
    }
    self
  }

  pub fn parts(&self) -> &[Predicate] {
    &self.parts
  }

  pub fn evaluate(&self, target: &Target) -> Evaluation {
    self
      .parts
      .iter()
      .fold(Evaluation::Matched, |acc, p| acc.and(p.evaluate(target)))
  }

  pub fn matches(&self, target: &Target) -> bool {
    self.evaluate(target).is_match()
  }
}

impl From<Predicate> for Constraint {
  fn from(predicate: Predicate) -> Self {
    Constraint::new().and(predicate)
  }
}
