/// Shared HTTP plumbing for source adapters: pacing, timeouts, bounded retries
use crate::errors::{AdapterError, AdapterResult};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Paces outbound requests so a source never sees more than
/// `max_per_minute` calls. Callers are serialized while waiting.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize) -> Self {
        let min_interval = if max_per_minute > 0 {
            Duration::from_secs_f64(60.0 / max_per_minute as f64)
        } else {
            Duration::ZERO
        };

        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Sleep until the next request slot is available
    pub async fn throttle(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        // Lock held across the sleep: one in-flight wait per source
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Bounded retry with linearly increasing backoff, shared by every adapter
///
/// Permanent errors (schema, not-found, disabled) short-circuit; only
/// transport-class failures are retried, and never past `max_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff before retrying after the given 1-based attempt number
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> AdapterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let mut last_error = AdapterError::Transport("no attempts made".to_string());

        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_permanent() => return Err(err),
                Err(err) => {
                    last_error = err;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay_for(attempt)).await;
                    }
                }
            }
        }

        Err(last_error)
    }
}

/// HTTP client wrapper with a fixed per-request timeout
pub struct HttpClient {
    client: Client,
    timeout_secs: u64,
}

impl HttpClient {
    pub fn new(timeout_secs: u64, accept_invalid_certs: bool) -> Result<Self, String> {
        if timeout_secs == 0 {
            return Err("timeout must be greater than zero".to_string());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| format!("failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            timeout_secs,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Map a reqwest failure onto the adapter error taxonomy
    pub fn classify(&self, err: reqwest::Error) -> AdapterError {
        if err.is_timeout() {
            AdapterError::Timeout(self.timeout_secs)
        } else if err.is_decode() {
            AdapterError::Schema(err.to_string())
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_stops_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: AdapterResult<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AdapterError::Transport("down".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_short_circuits_permanent_errors() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: AdapterResult<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AdapterError::NotFound("3pool".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(AdapterError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AdapterError::Transport("flaky".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("second attempt succeeds"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_increases_with_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert!(policy.delay_for(2) > policy.delay_for(1));
    }

    #[test]
    fn rate_limiter_interval_from_per_minute_cap() {
        let limiter = RateLimiter::new(30);
        assert_eq!(limiter.min_interval(), Duration::from_secs(2));
        assert_eq!(RateLimiter::new(0).min_interval(), Duration::ZERO);
    }
}
