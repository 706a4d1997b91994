//! Fixed-attempt retry for IaaS primitives.
//!
//! Create, delete, attach and detach calls against the IaaS backend are repeated a
//! fixed number of times with a fixed pause in between. Only errors the provider
//! marks as retryable are repeated; "not found" and rejected requests return at once.

use iaas_client::IaasError;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempts are used up
pub async fn retry_iaas<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, IaasError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IaasError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    error!("{} failed after {} attempts: {}", what, attempt, e);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_iaas(&fast(), "create port", || {
            let calls = &calls;
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(IaasError::Unavailable("flaky".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_fixed_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_iaas(&fast(), "attach port", || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IaasError::Api("down".to_string()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_iaas(&fast(), "delete port", || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IaasError::NotFound("port".to_string()))
            }
        })
        .await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
