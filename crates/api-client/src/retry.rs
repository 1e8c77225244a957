use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for idempotent requests.
///
/// Only transient errors (network, timeout, rate limit) are retried. Order
/// submissions never go through this path.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match request().await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient exchange error, retrying."
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        let result = policy
            .run("probe", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::Network("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(100));

        let result: Result<(), _> = policy
            .run("probe", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Timeout("slow".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = RetryPolicy::default()
            .run("probe", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::InsufficientMargin("no".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::InsufficientMargin(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }
}
