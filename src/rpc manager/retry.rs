//! Bounded retry with exponential backoff and jitter

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::rpc_errors::{RpcManagerError, RpcResult};

/// Retry configuration with jitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial attempt)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_jitter_factor() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Backoff delay for a given attempt (0-indexed)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exp_backoff = (self.base_backoff_ms as f64) * 2_f64.powi(attempt as i32);
        let capped_backoff = exp_backoff.min(self.max_backoff_ms as f64);

        let jitter_range = capped_backoff * self.jitter_factor.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_backoff = (capped_backoff + jitter).max(0.0);

        Duration::from_millis(final_backoff as u64)
    }
}

/// Retry an async ledger call while it fails with a retryable error.
///
/// Non-retryable errors are returned immediately. After the last attempt the
/// final error is returned unchanged so callers can still tell a timeout from
/// a transport failure.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> RpcResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RpcResult<T>>,
{
    let start_time = std::time::Instant::now();
    let mut last_error = None;
    let max_attempts = config.max_attempts.max(1);

    for attempt in 0..max_attempts {
        if attempt > 0 {
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts,
                "Retrying operation"
            );
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    debug!(
                        operation = operation_name,
                        error = %err,
                        "Permanent error, not retrying"
                    );
                    return Err(err);
                }

                if attempt + 1 < max_attempts {
                    let backoff = config.calculate_backoff(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Transient error, backing off before retry"
                    );
                    sleep(backoff).await;
                } else {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "All retry attempts exhausted"
                    );
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        RpcManagerError::Internal("Retry exhausted without error".to_string())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transport() -> RpcManagerError {
        RpcManagerError::Transport {
            endpoint: "test".to_string(),
            message: "connection reset".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_first_attempt() {
        let result = retry_with_backoff("test_op", &RetryConfig::immediate(3), |_| async {
            Ok::<i32, RpcManagerError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_errors() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result = retry_with_backoff("test_op", &RetryConfig::immediate(3), |_| {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(transport())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_ledger_rejection() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result: RpcResult<()> = retry_with_backoff("test_op", &RetryConfig::immediate(5), |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RpcManagerError::RpcResponse {
                    endpoint: "test".to_string(),
                    message: "Blockhash not found".to_string(),
                    code: Some(-32002),
                    logs: vec![],
                })
            }
        })
        .await;

        assert!(matches!(result, Err(RpcManagerError::RpcResponse { .. })));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_all_attempts() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result: RpcResult<()> = retry_with_backoff("test_op", &RetryConfig::immediate(3), |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(transport()) }
        })
        .await;

        assert!(matches!(result, Err(RpcManagerError::Transport { .. })));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_backoff_ms: 100,
            max_backoff_ms: 400,
            jitter_factor: 0.0,
        };
        assert_eq!(config.calculate_backoff(0), Duration::from_millis(100));
        assert_eq!(config.calculate_backoff(1), Duration::from_millis(200));
        assert_eq!(config.calculate_backoff(5), Duration::from_millis(400));
    }
}
