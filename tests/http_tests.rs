// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::Arc;

use contract_chat::chat::{ChatSession, Settled};
use contract_chat::client::api::ChatApi;
use contract_chat::client::transport::{HttpRequest, Transport};
use contract_chat::client::{HttpTransport, UploadFile};
use contract_chat::config::{AskMode, BackendConfig, Settings, UserMode};
use contract_chat::conversation::Role;
use contract_chat::error::ErrorKind;
use contract_chat::stream::{events, StreamEvent};
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(frames: &[(&str, serde_json::Value)]) -> String {
    frames
        .iter()
        .map(|(event, data)| format!("event: {}\ndata: {}\n\n", event, data))
        .collect()
}

#[tokio::test]
async fn test_send_posts_json_with_bearer_token() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ask"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(json!({"question": "Who pays rent?", "hasContext": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "The tenant."})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport =
        HttpTransport::new(mock_server.uri()).with_token(Some("secret-token".to_string()));
    let api = ChatApi::new(&BackendConfig::default());

    let response = transport
        .send(&api.ask_request("Who pays rent?", true).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(response.body.contains("The tenant."));
}

#[tokio::test]
async fn test_send_returns_error_statuses_as_responses() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ask"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Token expired"})),
        )
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(mock_server.uri());
    let response = transport
        .send(&HttpRequest::post_json("/ask", json!({"question": "q"})))
        .await
        .unwrap();

    assert!(!response.is_success());
    let error = response.to_error();
    assert_eq!(error.kind, ErrorKind::ClientRejection);
    assert_eq!(error.message, "Token expired");
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    // Nothing listens on the discard port.
    let transport = HttpTransport::new("http://127.0.0.1:9");
    let error = transport
        .send(&HttpRequest::get("/ask"))
        .await
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::Transport);
}

#[tokio::test]
async fn test_upload_is_multipart_file_part() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("filename=\"lease.pdf\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Indexed",
            "data": {"contractId": "c-9", "chunksIndexed": 14, "processingTime": 950}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(mock_server.uri());
    let api = ChatApi::new(&BackendConfig::default());
    let file = UploadFile::new("lease.pdf", "application/pdf", b"%PDF-1.7".to_vec());

    let response = transport.send(&api.upload_request(&file)).await.unwrap();

    assert!(response.is_success());
}

#[tokio::test]
async fn test_open_stream_decodes_events() {
    let mock_server = MockServer::start().await;
    let body = sse(&[
        ("connected", json!({})),
        ("chunk", json!({"text": "Three"})),
        ("chunk", json!({"text": " months."})),
        ("complete", json!({})),
    ]);
    Mock::given(method("POST"))
        .and(path("/ask/stream"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(mock_server.uri());
    let api = ChatApi::new(&BackendConfig::default());
    let request = api.stream_request("Notice period?", None, UserMode::Business).unwrap();

    let stream = transport.open_stream(&request).await.unwrap();
    let collected: Vec<StreamEvent> = events(stream).collect().await;

    assert_eq!(
        collected,
        vec![
            StreamEvent::Chunk("Three".into()),
            StreamEvent::Chunk(" months.".into()),
            StreamEvent::Done {
                answer: None,
                telemetry: None
            },
        ]
    );
}

#[tokio::test]
async fn test_open_stream_classifies_rejection() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ask/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(mock_server.uri());
    let result = transport
        .open_stream(&HttpRequest::post_json("/ask/stream", json!({})))
        .await;

    match result {
        Err(error) => {
            assert_eq!(error.kind, ErrorKind::Server);
            assert_eq!(error.status, Some(503));
        }
        Ok(_) => panic!("expected rejection"),
    }
}

#[tokio::test]
async fn test_session_over_http_upload_then_stream() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "message": "Indexed",
            "data": {"contractId": "c-77", "chunksIndexed": 14, "processingTimeMs": 1800}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ask/stream"))
        .and(body_partial_json(json!({"contextId": "c-77", "mode": "jurist"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse(&[
                ("chunk", json!({"text": "Three months."})),
                ("citations", json!({"citations": [{"id": "source_1", "page": 2}], "count": 1})),
                ("complete", json!({"answer": "Three months."})),
            ]),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = ChatSession::builder(Settings::default())
        .with_transport(Arc::new(HttpTransport::new(mock_server.uri())))
        .with_mode(AskMode::Streaming)
        .with_user_mode(UserMode::Jurist)
        .build()
        .unwrap();

    let file = UploadFile::new("lease.pdf", "application/pdf", b"%PDF-1.7".to_vec());
    assert!(matches!(session.upload(file).await.unwrap(), Settled::Succeeded(_)));
    let settled = session.ask("What is the notice period?").await.unwrap();
    assert!(matches!(settled, Settled::Succeeded(_)));

    let messages = session.messages();
    let answer = messages.last().unwrap();
    assert_eq!(answer.role, Role::Assistant);
    assert_eq!(answer.text, "Three months.");
    assert_eq!(answer.citations.len(), 1);
}
