use log::warn;
use std::{future::Future, time::Duration};

use crate::error::{ApiError, MigrationError, reason};

pub const DEFAULT_ATTEMPTS: u32 = 10;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Attempt budget shared by every remote operation of a run.
///
/// Each attempt spends one unit and any success refills the budget, so the
/// budget bounds the number of consecutive failures, whichever operations
/// they belong to. Sharing it is only sound because operations never overlap.
#[derive(Debug)]
pub struct RetryBudget {
    attempts: u32,
    remaining: u32,
    backoff: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, Duration::from_secs(1))
    }
}

impl RetryBudget {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts,
            remaining: attempts,
            backoff,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset(&mut self) {
        self.remaining = self.attempts;
    }

    /// Use up one attempt for `operation`.
    pub fn spend(&mut self, operation: &str) -> Result<(), MigrationError> {
        if self.remaining == 0 {
            return Err(MigrationError::RetriesExhausted {
                operation: operation.to_string(),
            });
        }
        self.remaining -= 1;
        Ok(())
    }

    fn delay(&self, retry_after: Option<Duration>) -> Duration {
        let failures = self.attempts.saturating_sub(self.remaining).saturating_sub(1);
        let exponential = self
            .backoff
            .saturating_mul(2u32.saturating_pow(failures.min(6)))
            .min(MAX_BACKOFF);

        retry_after.map_or(exponential, |hint| hint.max(exponential))
    }

    /// Run `call` until it succeeds, the budget runs out, or it fails in a way
    /// that retrying cannot fix.
    pub async fn run<T, F, Fut>(&mut self, operation: &str, mut call: F) -> Result<T, MigrationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        loop {
            self.spend(operation)?;

            match call().await {
                Ok(value) => {
                    self.reset();
                    return Ok(value);
                }
                Err(ApiError::Status {
                    status,
                    message,
                    retry_after,
                }) => {
                    warn!(
                        "{} returned status code: {} ({}), {} tries left",
                        operation,
                        status.as_u16(),
                        reason(status),
                        self.remaining
                    );
                    warn!("Error message: {}", message);
                    tokio::time::sleep(self.delay(retry_after)).await;
                }
                Err(error) => return Err(MigrationError::unrecoverable(operation, error)),
            }
        }
    }
}
