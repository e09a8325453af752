//! Cancellation and deadlines for external calls.
//!
//! Every call that leaves this crate (recipe loads, version lookups, artifact
//! resolution) runs through [`ResolveContext::run`], so a caller can abort a
//! whole plan generation from outside.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
  #[error("operation cancelled")]
  Cancelled,

  #[error("deadline exceeded")]
  TimedOut,
}

/// Caller-supplied cancellation token and optional deadline.
///
/// Clones share the same token, so cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
  cancel: CancellationToken,
  deadline: Option<Instant>,
}

impl ResolveContext {
  pub fn new() -> Self {
    Self::default()
  }

  /// Use an existing token, e.g. one tied to a signal handler.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  pub fn with_deadline(mut self, deadline: Instant) -> Self {
    self.deadline = Some(deadline);
    self
  }

  pub fn with_timeout(self, timeout: Duration) -> Self {
    self.with_deadline(Instant::now() + timeout)
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  pub fn cancellation_token(&self) -> &CancellationToken {
    &self.cancel
  }

  /// A context cancelled with this one but cancellable on its own.
  pub fn child(&self) -> Self {
    Self {
      cancel: self.cancel.child_token(),
      deadline: self.deadline,
    }
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  /// Fails if the context is already cancelled or past its deadline.
  pub fn check(&self) -> Result<(), Interrupted> {
    if self.cancel.is_cancelled() {
      return Err(Interrupted::Cancelled);
    }
    if let Some(deadline) = self.deadline
      && Instant::now() >= deadline
    {
      return Err(Interrupted::TimedOut);
    }
    Ok(())
  }

  /// Drive `fut` to completion unless the context is cancelled or times out first.
  pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
    self.check()?;
    match self.deadline {
      Some(deadline) => tokio::select! {
        biased;
        _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
        out = tokio::time::timeout_at(deadline, fut) => out.map_err(|_| Interrupted::TimedOut),
      },
      None => tokio::select! {
        biased;
        _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
        out = fut => Ok(out),
      },
    }
  }
}
