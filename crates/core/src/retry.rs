use std::{future::Future, time::Duration};

use tracing::warn;

use crate::error::{QuizError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Authentication,
    RateLimited,
    Timeout,
    Transport,
    Fatal,
}

/// When and how often a remote call is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause before each retry.
    pub cooldown: Duration,
    pub retryable: Vec<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(60),
            retryable: vec![
                ErrorClass::RateLimited,
                ErrorClass::Timeout,
                ErrorClass::Transport,
            ],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, class: ErrorClass) -> bool {
        self.retryable.contains(&class)
    }

    /// Whether a failure of `class` on attempt number `attempt` (1-based)
    /// earns another attempt.
    pub fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        self.is_retryable(class) && attempt < self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(err.class(), attempt) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        cooldown_secs = self.cooldown.as_secs(),
                        error = %err,
                        "remote call failed, retrying after cooldown"
                    );
                    tokio::time::sleep(self.cooldown).await;
                    attempt += 1;
                }
                Err(err) if self.is_retryable(err.class()) => {
                    return Err(QuizError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
