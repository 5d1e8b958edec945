//! Bounded retry with fixed backoff for calls to the time tracking service

use log::warn;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::RemoteError;
use crate::error::{BridgeError, Result};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    /// Wait between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// Execute `call` until it succeeds, fails permanently, or attempts run out
    ///
    /// Only transient failures are retried. The backoff wait ends early with
    /// `BridgeError::Cancelled` when `cancel` fires; the first attempt always runs.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(RemoteError::Transient(reason)) => {
                    if attempt >= attempts {
                        return Err(BridgeError::RemoteUnavailable {
                            operation: operation.to_string(),
                            attempts: attempt,
                            reason,
                        });
                    }
                    warn!(
                        "{} failed (attempt {} of {}): {}; retrying in {:?}",
                        operation, attempt, attempts, reason, self.backoff
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                }
                Err(RemoteError::Unauthorized) => {
                    return Err(BridgeError::auth(format!(
                        "{} was refused: credential rejected or expired",
                        operation
                    )));
                }
                Err(RemoteError::Rejected { status, body }) => {
                    return Err(BridgeError::Rejected {
                        operation: operation.to_string(),
                        status,
                        body,
                    });
                }
            }
        }
    }
}
