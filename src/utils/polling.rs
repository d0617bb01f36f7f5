/// Polling utilities for waiting on conditions with timeout
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Raised when a polled condition never became true
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("timeout after {seconds} seconds: {description}")]
pub struct PollTimeout {
    pub description: String,
    pub seconds: u64,
}

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub description: String,
}

impl PollingConfig {
    /// Create a new polling configuration
    pub fn new(timeout: Duration, interval: Duration, description: impl Into<String>) -> Self {
        Self {
            timeout,
            interval,
            description: description.into(),
        }
    }

    /// Poll until condition is met or timeout
    ///
    /// The condition function should return:
    /// - Ok(Some(T)) when condition is met (returns T)
    /// - Ok(None) when condition is not yet met (continues polling)
    /// - Err(e) when an error occurs (stops polling and returns error)
    pub async fn poll<F, Fut, T, E>(&self, condition: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: From<PollTimeout>,
    {
        debug!("{}...", self.description);

        let start = Instant::now();

        loop {
            if let Some(value) = condition().await? {
                debug!("✓ {}", self.description);
                return Ok(value);
            }

            if start.elapsed() > self.timeout {
                return Err(PollTimeout {
                    description: self.description.clone(),
                    seconds: self.timeout.as_secs(),
                }
                .into());
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_polling_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let config = PollingConfig::new(
            Duration::from_secs(10),
            Duration::from_millis(10),
            "test polling",
        );

        let result: Result<u32, PollTimeout> = config
            .poll(|| {
                let c = counter_clone.clone();
                async move {
                    let val = c.fetch_add(1, Ordering::SeqCst);
                    if val >= 2 {
                        Ok(Some(val))
                    } else {
                        Ok(None)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert!(counter.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_polling_timeout() {
        let config = PollingConfig::new(
            Duration::from_millis(50),
            Duration::from_millis(10),
            "test timeout",
        );

        let result = config
            .poll(|| async { Ok::<Option<()>, PollTimeout>(None) })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.description, "test timeout");
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn test_polling_propagates_errors() {
        #[derive(Debug, PartialEq)]
        enum TestError {
            Boom,
            Timeout,
        }
        impl From<PollTimeout> for TestError {
            fn from(_: PollTimeout) -> Self {
                TestError::Timeout
            }
        }

        let config = PollingConfig::new(
            Duration::from_secs(10),
            Duration::from_millis(10),
            "test errors",
        );
        let result = config
            .poll(|| async { Err::<Option<()>, _>(TestError::Boom) })
            .await;
        assert_eq!(result, Err(TestError::Boom));
    }
}
