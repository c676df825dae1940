//! Retry with exponential backoff
//!
//! Each task attempt moves through
//! `Pending -> Running -> (Succeeded | FailedRetriable -> Pending | FailedTerminal)`.
//! A failure is retried only when the error says it is retriable and the
//! retry budget is not spent.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use logiq_core::config::WorkerSettings;
use tracing::{error, warn};

/// Errors that know whether another attempt could succeed.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&WorkerSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Running,
    Succeeded,
    FailedRetriable { retry_in: Duration },
    FailedTerminal,
}

impl AttemptState {
    pub fn is_final(&self) -> bool {
        matches!(self, AttemptState::Succeeded | AttemptState::FailedTerminal)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Pending => f.write_str("pending"),
            AttemptState::Running => f.write_str("running"),
            AttemptState::Succeeded => f.write_str("succeeded"),
            AttemptState::FailedRetriable { retry_in } => write!(f, "failed_retriable ({retry_in:?})"),
            AttemptState::FailedTerminal => f.write_str("failed_terminal"),
        }
    }
}

/// Attempt counter and state for one task.
#[derive(Debug, Clone)]
pub struct TaskAttempts {
    policy: RetryPolicy,
    state: AttemptState,
    attempts: u32,
}

impl TaskAttempts {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: AttemptState::Pending,
            attempts: 0,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pending -> Running. Returns `false` if the task is not pending.
    pub fn start(&mut self) -> bool {
        if self.state != AttemptState::Pending {
            return false;
        }
        self.attempts += 1;
        self.state = AttemptState::Running;
        true
    }

    pub fn succeed(&mut self) {
        if self.state == AttemptState::Running {
            self.state = AttemptState::Succeeded;
        }
    }

    /// Running -> FailedRetriable or FailedTerminal.
    pub fn fail(&mut self, retriable: bool) -> AttemptState {
        if self.state != AttemptState::Running {
            return self.state;
        }
        self.state = if retriable && self.attempts <= self.policy.max_retries {
            AttemptState::FailedRetriable {
                retry_in: self.policy.backoff(self.attempts),
            }
        } else {
            AttemptState::FailedTerminal
        };
        self.state
    }

    /// FailedRetriable -> Pending, once the backoff has elapsed.
    pub fn requeue(&mut self) {
        if matches!(self.state, AttemptState::FailedRetriable { .. }) {
            self.state = AttemptState::Pending;
        }
    }
}

/// The task gave up; carries the last error.
#[derive(Debug)]
pub struct TaskFailure<E> {
    pub attempts: u32,
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempts)", self.error, self.attempts)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for TaskFailure<E> {}

/// Runs `operation` until it succeeds or fails for good.
///
/// Every attempt starts from scratch; on success the value is returned with
/// the number of attempts it took.
pub async fn run_with_retry<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<(T, u32), TaskFailure<E>>
where
    E: Retriable + fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut task = TaskAttempts::new(policy);

    loop {
        task.start();
        match operation(task.attempts()).await {
            Ok(value) => {
                task.succeed();
                return Ok((value, task.attempts()));
            }
            Err(e) => match task.fail(e.is_retriable()) {
                AttemptState::FailedRetriable { retry_in } => {
                    warn!(
                        attempt = task.attempts(),
                        max_attempts = policy.max_attempts(),
                        delay_ms = retry_in.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retry scheduled"
                    );
                    tokio::time::sleep(retry_in).await;
                    task.requeue();
                }
                _ => {
                    error!(attempts = task.attempts(), retriable = e.is_retriable(), error = %e, "Task failed permanently");
                    return Err(TaskFailure {
                        attempts: task.attempts(),
                        error: e,
                    });
                }
            },
        }
    }
}
