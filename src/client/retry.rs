// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retry logic for backend calls with exponential backoff

use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::cancel::Deadline;
use crate::client::transport::{HttpRequest, HttpResponse, Transport};
use crate::config::settings::ResilienceConfig;
use crate::error::{ErrorInfo, ErrorKind};
use crate::outcome::Outcome;

/// Backoff shape: how many retries and how long to wait between them
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Base delay in milliseconds (exponentially increased)
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Jitter percentage (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for RetryConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter: config.jitter,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        // Exponential backoff: base * 2^attempt
        let exponential_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = exponential_ms.min(self.max_delay_ms);

        if self.jitter <= 0.0 {
            return Duration::from_millis(capped_ms);
        }

        let jitter_range = (capped_ms as f64 * self.jitter) as i64;
        let mut rng = rand::rng();
        let jitter_ms = rng.random_range(-jitter_range..=jitter_range);

        let final_ms = (capped_ms as i64 + jitter_ms).max(0) as u64;
        Duration::from_millis(final_ms)
    }
}

/// Decides whether a failed attempt may be repeated
pub type RetryPredicate = Arc<dyn Fn(&ErrorInfo) -> bool + Send + Sync>;

/// Determine if a failure is retryable under the default policy
pub fn is_retryable(error: &ErrorInfo) -> bool {
    match error.kind {
        // Retry on transient failures
        ErrorKind::Transport => true,
        ErrorKind::Server => match error.status {
            // Retry on 5xx errors
            Some(status) => (500..600).contains(&status),
            None => true,
        },

        // Don't retry on client errors or garbage responses
        ErrorKind::ClientRejection => false,
        ErrorKind::Protocol => false,
    }
}

/// Everything the issuer needs to know about one logical call
#[derive(Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
    /// Per-attempt timeout; expiry is a retryable transport failure
    pub attempt_timeout: Option<Duration>,
    retryable: RetryPredicate,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt_timeout: None,
            retryable: Arc::new(is_retryable),
        }
    }

    /// Replace the default retryable predicate
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&ErrorInfo) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn is_retryable(&self, error: &ErrorInfo) -> bool {
        (self.retryable)(error)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

/// Issues one logical request with bounded retries
#[derive(Clone)]
pub struct RetryingRequestIssuer {
    transport: Arc<dyn Transport>,
}

impl RetryingRequestIssuer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send `request` until it succeeds, fails for good, or `token` fires.
    ///
    /// Never returns a non-success response as `Success`. A cancelled token
    /// resolves to `Cancelled` even mid-request or mid-backoff.
    pub async fn issue(
        &self,
        request: &HttpRequest,
        policy: &RetryPolicy,
        token: &CancellationToken,
    ) -> Outcome<HttpResponse> {
        let mut attempt: u32 = 0;

        loop {
            if token.is_cancelled() {
                return Outcome::Cancelled;
            }

            let error = match self.attempt(request, policy, token).await {
                Ok(response) if response.is_success() => {
                    if attempt > 0 {
                        tracing::info!(
                            target: "contract_chat.retry",
                            path = %request.path,
                            attempts = attempt + 1,
                            "request succeeded after retries"
                        );
                    }
                    return Outcome::Success(response);
                }
                Ok(response) => response.to_error(),
                Err(Some(error)) => error,
                Err(None) => return Outcome::Cancelled,
            };
            let error = error.with_attempts(attempt + 1);

            if !policy.is_retryable(&error) {
                tracing::debug!(
                    target: "contract_chat.retry",
                    path = %request.path,
                    %error,
                    "non-retryable failure"
                );
                return Outcome::Failed(error);
            }

            if attempt >= policy.config.max_retries {
                tracing::warn!(
                    target: "contract_chat.retry",
                    path = %request.path,
                    attempts = attempt + 1,
                    %error,
                    "retries exhausted"
                );
                return Outcome::Failed(error.exhausted());
            }

            let delay = policy.config.calculate_delay(attempt);
            tracing::debug!(
                target: "contract_chat.retry",
                path = %request.path,
                attempt = attempt + 1,
                max_retries = policy.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                %error,
                "retrying after backoff"
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => return Outcome::Cancelled,
                _ = sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// One network attempt. `Err(None)` means the caller cancelled.
    async fn attempt(
        &self,
        request: &HttpRequest,
        policy: &RetryPolicy,
        token: &CancellationToken,
    ) -> Result<HttpResponse, Option<ErrorInfo>> {
        let deadline = Deadline::after(token, policy.attempt_timeout);

        tokio::select! {
            biased;
            _ = deadline.token().cancelled() => {
                if deadline.expired() && !token.is_cancelled() {
                    let timeout_ms = policy
                        .attempt_timeout
                        .map(|t| t.as_millis() as u64)
                        .unwrap_or_default();
                    Err(Some(ErrorInfo::transport(format!(
                        "request timed out after {}ms",
                        timeout_ms
                    ))))
                } else {
                    Err(None)
                }
            }
            result = self.transport.send(request) => result.map_err(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock_transport::{MockReply, MockTransport};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            base_delay_ms: 10,
            max_delay_ms: 1000,
            jitter: 0.0,
        })
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 16000);
        assert_eq!(config.jitter, 0.0);
    }

    #[test]
    fn test_calculate_delay() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 16000,
            jitter: 0.0,
        };

        assert_eq!(config.calculate_delay(0).as_millis(), 1000);
        assert_eq!(config.calculate_delay(1).as_millis(), 2000);
        assert_eq!(config.calculate_delay(2).as_millis(), 4000);
        assert_eq!(config.calculate_delay(3).as_millis(), 8000);
        // Capped
        assert_eq!(config.calculate_delay(4).as_millis(), 16000);
        assert_eq!(config.calculate_delay(5).as_millis(), 16000);
    }

    #[test]
    fn test_calculate_delay_does_not_overflow() {
        let config = RetryConfig {
            max_retries: 100,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            jitter: 0.0,
        };
        assert_eq!(config.calculate_delay(90).as_millis(), 5000);
    }

    #[test]
    fn test_calculate_delay_with_jitter() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 16000,
            jitter: 0.5,
        };

        let millis = config.calculate_delay(0).as_millis() as i64;
        assert!((500..=1500).contains(&millis));
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&ErrorInfo::transport("connection reset")));
        assert!(is_retryable(&ErrorInfo::server(Some(500), "boom")));
        assert!(is_retryable(&ErrorInfo::server(Some(599), "boom")));
        assert!(is_retryable(&ErrorInfo::server(None, "stream error")));

        assert!(!is_retryable(&ErrorInfo::client_rejection(Some(400), "bad")));
        assert!(!is_retryable(&ErrorInfo::client_rejection(Some(429), "slow down")));
        assert!(!is_retryable(&ErrorInfo::protocol("bad json")));
    }

    #[tokio::test]
    async fn test_issue_success_first_try() {
        let transport = Arc::new(MockTransport::new().with_reply("/ask", MockReply::ok("{}")));
        let issuer = RetryingRequestIssuer::new(transport.clone());

        let outcome = issuer
            .issue(
                &HttpRequest::get("/ask"),
                &fast_policy(3),
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(transport.call_count("/ask"), 1);
    }

    #[tokio::test]
    async fn test_issue_recovers_after_transport_errors() {
        let transport = Arc::new(
            MockTransport::new()
                .with_reply("/ask", MockReply::transport_error("reset"))
                .with_reply("/ask", MockReply::transport_error("reset"))
                .with_reply("/ask", MockReply::ok(r#"{"answer":"ok"}"#)),
        );
        let issuer = RetryingRequestIssuer::new(transport.clone());

        let outcome = issuer
            .issue(
                &HttpRequest::get("/ask"),
                &fast_policy(5),
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(transport.call_count("/ask"), 3);
    }

    #[tokio::test]
    async fn test_issue_exhausts_retries() {
        let transport = Arc::new(
            MockTransport::new().with_replies("/ask", vec![MockReply::status(503, "{}"); 4]),
        );
        let issuer = RetryingRequestIssuer::new(transport.clone());

        let outcome = issuer
            .issue(
                &HttpRequest::get("/ask"),
                &fast_policy(3),
                &CancellationToken::new(),
            )
            .await;

        match outcome {
            Outcome::Failed(error) => {
                assert!(error.exhausted);
                assert_eq!(error.attempts, 4);
                assert_eq!(error.kind, ErrorKind::Server);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(transport.call_count("/ask"), 4);
    }

    #[tokio::test]
    async fn test_issue_zero_retries_makes_one_attempt() {
        let transport = Arc::new(
            MockTransport::new().with_reply("/ask", MockReply::transport_error("down")),
        );
        let issuer = RetryingRequestIssuer::new(transport.clone());

        let outcome = issuer
            .issue(
                &HttpRequest::get("/ask"),
                &fast_policy(0),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(outcome, Outcome::Failed(ref e) if e.exhausted && e.attempts == 1));
        assert_eq!(transport.call_count("/ask"), 1);
    }

    #[tokio::test]
    async fn test_custom_predicate_stops_retries() {
        let transport = Arc::new(
            MockTransport::new().with_replies("/ask", vec![MockReply::status(500, "{}"); 3]),
        );
        let issuer = RetryingRequestIssuer::new(transport.clone());
        let policy = fast_policy(3).with_predicate(|e| e.kind == ErrorKind::Transport);

        let outcome = issuer
            .issue(&HttpRequest::get("/ask"), &policy, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, Outcome::Failed(ref e) if !e.exhausted));
        assert_eq!(transport.call_count("/ask"), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_makes_no_attempt() {
        let transport = Arc::new(MockTransport::new().with_reply("/ask", MockReply::ok("{}")));
        let issuer = RetryingRequestIssuer::new(transport.clone());
        let token = CancellationToken::new();
        token.cancel();

        let outcome = issuer
            .issue(&HttpRequest::get("/ask"), &fast_policy(3), &token)
            .await;

        assert!(outcome.is_cancelled());
        assert_eq!(transport.call_count("/ask"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retryable_transport_error() {
        let transport = Arc::new(
            MockTransport::new()
                .with_reply("/ask", MockReply::hang())
                .with_reply("/ask", MockReply::ok("{}")),
        );
        let issuer = RetryingRequestIssuer::new(transport.clone());
        let policy = fast_policy(1).with_attempt_timeout(Some(Duration::from_millis(100)));

        let outcome = issuer
            .issue(&HttpRequest::get("/ask"), &policy, &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(transport.call_count("/ask"), 2);
    }
}
