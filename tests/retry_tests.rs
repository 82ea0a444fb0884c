// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::Arc;
use std::time::Duration;

use contract_chat::client::mock_transport::{MockReply, MockTransport};
use contract_chat::client::retry::{RetryConfig, RetryPolicy, RetryingRequestIssuer};
use contract_chat::client::transport::HttpRequest;
use contract_chat::error::ErrorKind;
use contract_chat::outcome::Outcome;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

fn policy(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> RetryPolicy {
    RetryPolicy::new(RetryConfig {
        max_retries,
        base_delay_ms,
        max_delay_ms,
        jitter: 0.0,
    })
}

fn ask() -> HttpRequest {
    HttpRequest::post_json("/ask", serde_json::json!({"question": "q", "hasContext": false}))
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_are_exact() {
    let transport = Arc::new(MockTransport::new().with_replies(
        "/ask",
        vec![
            MockReply::status(503, "{}"),
            MockReply::status(502, "{}"),
            MockReply::transport_error("connection reset"),
            MockReply::ok(r#"{"answer":"ok"}"#),
        ],
    ));
    let issuer = RetryingRequestIssuer::new(transport.clone());

    let outcome = issuer
        .issue(&ask(), &policy(3, 100, 10_000), &CancellationToken::new())
        .await;

    assert!(outcome.is_success());
    let calls = transport.calls();
    assert_eq!(calls.len(), 4);
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let transport = Arc::new(
        MockTransport::new().with_replies("/ask", vec![MockReply::status(500, "{}"); 4]),
    );
    let issuer = RetryingRequestIssuer::new(transport.clone());

    let outcome = issuer
        .issue(&ask(), &policy(3, 100, 250), &CancellationToken::new())
        .await;

    assert!(matches!(outcome, Outcome::Failed(ref e) if e.exhausted && e.attempts == 4));
    let calls = transport.calls();
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(250)
        ]
    );
}

#[tokio::test]
async fn test_client_rejection_is_not_retried() {
    let transport = Arc::new(MockTransport::new().with_replies(
        "/ask",
        vec![
            MockReply::status(400, r#"{"message":"Question is too long"}"#),
            MockReply::ok("{}"),
        ],
    ));
    let issuer = RetryingRequestIssuer::new(transport.clone());

    let outcome = issuer
        .issue(&ask(), &policy(5, 1, 10), &CancellationToken::new())
        .await;

    match outcome {
        Outcome::Failed(error) => {
            assert_eq!(error.kind, ErrorKind::ClientRejection);
            assert_eq!(error.status, Some(400));
            assert_eq!(error.message, "Question is too long");
            assert_eq!(error.attempts, 1);
            assert!(!error.exhausted);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(transport.call_count("/ask"), 1);
}

#[tokio::test]
async fn test_rate_limit_is_not_retried() {
    let transport =
        Arc::new(MockTransport::new().with_reply("/ask", MockReply::status(429, "{}")));
    let issuer = RetryingRequestIssuer::new(transport.clone());

    let outcome = issuer
        .issue(&ask(), &policy(3, 1, 10), &CancellationToken::new())
        .await;

    assert!(matches!(outcome, Outcome::Failed(ref e) if e.kind == ErrorKind::ClientRejection));
    assert_eq!(transport.call_count("/ask"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let transport = Arc::new(MockTransport::new().with_replies(
        "/ask",
        vec![MockReply::status(503, "{}"), MockReply::ok("{}")],
    ));
    let issuer = RetryingRequestIssuer::new(transport.clone());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let outcome = issuer.issue(&ask(), &policy(3, 1000, 8000), &token).await;

    assert!(outcome.is_cancelled());
    assert_eq!(transport.call_count("/ask"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_request() {
    let transport = Arc::new(MockTransport::new().with_reply("/ask", MockReply::hang()));
    let issuer = RetryingRequestIssuer::new(transport.clone());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let outcome = issuer
        .issue(
            &ask(),
            &policy(3, 100, 1000).with_attempt_timeout(Some(Duration::from_secs(30))),
            &token,
        )
        .await;

    assert!(outcome.is_cancelled());
    assert_eq!(transport.call_count("/ask"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_exhaust_as_transport_errors() {
    let transport = Arc::new(
        MockTransport::new().with_replies("/ask", vec![MockReply::hang(), MockReply::hang()]),
    );
    let issuer = RetryingRequestIssuer::new(transport.clone());

    let outcome = issuer
        .issue(
            &ask(),
            &policy(1, 10, 100).with_attempt_timeout(Some(Duration::from_millis(200))),
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        Outcome::Failed(error) => {
            assert_eq!(error.kind, ErrorKind::Transport);
            assert!(error.exhausted);
            assert!(error.message.contains("timed out"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

proptest! {
    #[test]
    fn prop_delay_is_monotonic_and_capped(
        base in 1u64..5_000,
        max in 1u64..120_000,
        attempt in 0u32..64,
    ) {
        let config = RetryConfig { max_retries: 64, base_delay_ms: base, max_delay_ms: max, jitter: 0.0 };
        let current = config.calculate_delay(attempt);
        let next = config.calculate_delay(attempt + 1);
        prop_assert!(current <= next);
        prop_assert!(next <= Duration::from_millis(max));
    }

    #[test]
    fn prop_jitter_stays_in_range(attempt in 0u32..10, jitter in 0.0f64..=1.0) {
        let config = RetryConfig { max_retries: 10, base_delay_ms: 100, max_delay_ms: 10_000, jitter };
        let nominal = (100u64 << attempt).min(10_000) as f64;
        let millis = config.calculate_delay(attempt).as_millis() as f64;
        prop_assert!(millis >= (nominal * (1.0 - jitter)).floor() - 1.0);
        prop_assert!(millis <= (nominal * (1.0 + jitter)).ceil() + 1.0);
    }
}
