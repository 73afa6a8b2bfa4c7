//! Retrying fetcher
//!
//! Wraps a [`Transport`] with an explicit [`RetryPolicy`]: a bounded number of
//! attempts, a fixed delay between them and an independent timeout per
//! attempt. Holds no state across requests.

use crate::error::{ExtractError, Result};
use crate::transport::{redact, Transport};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Retry policy for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one; at least 1
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
    /// Timeout applied to every attempt separately
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(crate::config::DEFAULT_RETRY_DELAY_MS),
            timeout: Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS),
        }
    }
}

impl RetryPolicy {
    /// Upper bound on the time one request can take, delays included
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        self.timeout * attempts + self.delay * (attempts - 1)
    }
}

/// Issues requests through a transport according to a retry policy
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch a JSON document, retrying transient failures.
    ///
    /// Non-retryable failures are returned as-is after the first attempt. A
    /// request whose attempts all fail transiently ends in
    /// [`ExtractError::RetriesExhausted`] wrapping the last failure.
    pub async fn fetch(&self, url: &Url) -> Result<Value> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.attempt(url).await {
                Ok(doc) => {
                    if attempt > 1 {
                        debug!(url = %redact(url), attempt, "Request succeeded after retry");
                    }
                    return Ok(doc);
                },
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        url = %redact(url),
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Request attempt failed"
                    );
                    last_error = Some(e);

                    if attempt < attempts && !self.policy.delay.is_zero() {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                },
            }
        }

        let last = last_error.unwrap_or(ExtractError::UnexpectedResponse {
            url: redact(url),
            reason: "no attempt was made".to_string(),
        });
        Err(ExtractError::RetriesExhausted {
            url: redact(url),
            attempts,
            last: Box::new(last),
        })
    }

    /// Fetch and deserialize a JSON document
    pub async fn fetch_as<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let doc = self.fetch(url).await?;
        Ok(serde_json::from_value(doc)?)
    }

    async fn attempt(&self, url: &Url) -> Result<Value> {
        match tokio::time::timeout(self.policy.timeout, self.transport.get_json(url)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractError::Timeout {
                url: redact(url),
                timeout: self.policy.timeout,
            }),
        }
    }
}
