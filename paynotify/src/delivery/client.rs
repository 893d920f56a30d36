//! HTTP delivery of one notification body, retried with backoff.

use metrics::counter;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::time::Instant;

use super::backoff::BackoffPolicy;
use super::error::DeliveryError;
use crate::config::DeliveryConfig;

/// Outcome of a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Status code of the successful response
    pub status: u16,
}

/// POSTs JSON bodies to webhook endpoints. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
    policy: BackoffPolicy,
}

impl DeliveryClient {
    pub fn new(config: &DeliveryConfig) -> Result<Self, reqwest::Error> {
        // reqwest is built without a bundled crypto provider. Installing fails harmlessly when
        // the binary already did it.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::with_policy(http, BackoffPolicy::from(config)))
    }

    pub fn with_policy(http: reqwest::Client, policy: BackoffPolicy) -> Self {
        Self { http, policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Deliver `body` to `url`, retrying failed attempts until one gets a 2xx response.
    ///
    /// Transport errors and non-2xx responses are both retried. Gives up with
    /// [`DeliveryError::RetriesExhausted`] after `max_attempts` attempts, or earlier if the next
    /// wait would cross `max_elapsed`.
    pub async fn deliver(&self, url: &str, token: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            counter!("paynotify_delivery_attempts_total").increment(1);
            tracing::debug!(url = %url, attempt = attempts, "Sending webhook HTTP request");

            let error = match self.attempt(url, token, body).await {
                Ok(status) => return Ok(DeliveryReceipt { attempts, status }),
                Err(e) => e,
            };

            let delay = self.policy.next_delay(attempts - 1);
            if !self.policy.allows_retry(attempts, started.elapsed(), delay) {
                return Err(DeliveryError::RetriesExhausted {
                    attempts,
                    last_error: Box::new(error),
                });
            }

            tracing::debug!(
                url = %url,
                attempt = attempts,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Webhook attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, url: &str, token: &str, body: &str) -> Result<u16, DeliveryError> {
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DeliveryError::Status { status: status.as_u16() })
        }
    }
}

/// Policy with millisecond waits for tests.
#[cfg(any(test, feature = "test-utils"))]
pub fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    use std::time::Duration;

    BackoffPolicy {
        initial_interval: Duration::from_millis(1),
        multiplier: 1.5,
        randomization_factor: 0.5,
        max_interval: Duration::from_millis(5),
        max_attempts,
        max_elapsed: Duration::from_secs(30),
    }
}
