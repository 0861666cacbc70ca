//! Scoped connection handling and connect retry
//!
//! Nodes that talk to an external system open a session per `execute`
//! call and must release it on every exit path. [`scoped`] owns that
//! discipline: it races the work against a timeout and closes the session
//! exactly once afterwards, whether the work succeeded, failed, or timed
//! out.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{NodeEngineError, Result};

/// A live client handle that must be closed after use
#[async_trait]
pub trait Closeable: Send {
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: Closeable + ?Sized> Closeable for Box<T> {
    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Run `work` against `session` under `timeout`, then close the session.
///
/// Close errors are logged and never replace the work's outcome.
pub async fn scoped<S, T, F>(mut session: S, timeout: Duration, work: F) -> Result<T>
where
    S: Closeable,
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T>>,
{
    let outcome = match tokio::time::timeout(timeout, work(&mut session)).await {
        Ok(result) => result,
        Err(_) => Err(NodeEngineError::Timeout(timeout.as_millis() as u64)),
    };

    if let Err(e) = session.close().await {
        log::warn!("Failed to close session cleanly: {}", e);
    }

    outcome
}

/// Bounded exponential backoff for connection attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Retry `op` while it fails with a retryable error and attempts remain
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                log::warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
