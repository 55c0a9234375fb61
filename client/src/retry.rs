use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// A bounded retry schedule with exponential backoff.
///
/// The first attempt runs immediately. Attempt `n + 1` waits
/// `initial_backoff * 2^(n - 1)`, capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_backoff: Duration::from_millis(50),
      max_backoff: Duration::from_secs(1),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
    Self {
      max_attempts,
      initial_backoff,
      max_backoff,
    }
  }

  /// A single attempt, never retried.
  pub fn no_retry() -> Self {
    Self::fixed(1, Duration::ZERO)
  }

  /// `max_attempts` attempts separated by a constant pause.
  pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
    Self::new(max_attempts, interval, interval)
  }

  /// The pause taken after the `attempt`-th failure (1-based).
  pub fn backoff_for(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    self
      .initial_backoff
      .checked_mul(1u32 << exponent)
      .unwrap_or(self.max_backoff)
      .min(self.max_backoff)
  }

  /// Runs `op` until it succeeds, fails with an error `is_retryable` rejects,
  /// or the attempt budget is spent. A zero budget still runs once.
  pub fn run<T, E, F, R>(&self, op: F, is_retryable: R) -> Result<T, E>
  where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
  {
    self.run_until(None, op, is_retryable)
  }

  /// Like [`run`](Self::run), but gives up instead of pausing past `budget`
  /// measured from the first attempt.
  pub fn run_within<T, E, F, R>(&self, budget: Duration, op: F, is_retryable: R) -> Result<T, E>
  where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
  {
    self.run_until(Instant::now().checked_add(budget), op, is_retryable)
  }

  fn run_until<T, E, F, R>(&self, deadline: Option<Instant>, mut op: F, is_retryable: R) -> Result<T, E>
  where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
  {
    let max_attempts = self.max_attempts.max(1);
    let mut attempt = 1;
    loop {
      match op(attempt) {
        Ok(value) => return Ok(value),
        Err(err) if attempt < max_attempts && is_retryable(&err) => {
          let pause = self.backoff_for(attempt);
          if let Some(deadline) = deadline {
            let resume = Instant::now().checked_add(pause);
            if resume.map_or(true, |resume| resume >= deadline) {
              debug!(attempt, max_attempts, error = %err, "retry deadline reached");
              return Err(err);
            }
          }
          debug!(attempt, max_attempts, ?pause, error = %err, "attempt failed, retrying");
          thread::sleep(pause);
          attempt += 1;
        }
        Err(err) => return Err(err),
      }
    }
  }
}
