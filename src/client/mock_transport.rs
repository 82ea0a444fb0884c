// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock transport for testing
//!
//! Provides a scripted implementation of the Transport trait that can be
//! used in tests without a running backend. Replies are queued per path and
//! handed out in order; every call is recorded with the (tokio) instant it
//! was made so backoff timing can be asserted under paused time.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::client::transport::{ByteStream, HttpRequest, HttpResponse, Transport};
use crate::error::ErrorInfo;

/// A scripted reply to `send`
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with a status and body, optionally after a delay
    Response {
        status: u16,
        body: String,
        delay: Option<Duration>,
    },
    /// Fail before any response arrives
    TransportError(String),
    /// Never respond
    Hang,
}

impl MockReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        MockReply::Response {
            status,
            body: body.into(),
            delay: None,
        }
    }

    pub fn delayed(status: u16, body: impl Into<String>, delay: Duration) -> Self {
        MockReply::Response {
            status,
            body: body.into(),
            delay: Some(delay),
        }
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        MockReply::TransportError(message.into())
    }

    pub fn hang() -> Self {
        MockReply::Hang
    }
}

/// One step of a scripted stream body
#[derive(Debug, Clone)]
pub enum MockChunk {
    Data(Vec<u8>),
    Delay(Duration),
    /// Channel breaks with a transport error
    Fail(String),
    /// Channel stays open without delivering anything
    Hang,
}

impl MockChunk {
    pub fn text(text: impl Into<String>) -> Self {
        MockChunk::Data(text.into().into_bytes())
    }
}

/// A scripted reply to `open_stream`
#[derive(Debug, Clone)]
pub enum MockStream {
    Open(Vec<MockChunk>),
    Reject(ErrorInfo),
}

impl MockStream {
    /// A stream delivering each string as its own chunk
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockStream::Open(chunks.into_iter().map(MockChunk::text).collect())
    }

    pub fn status(status: u16, body: &str) -> Self {
        MockStream::Reject(ErrorInfo::from_status(status, body))
    }
}

/// A recorded call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: HttpRequest,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<MockReply>>,
    streams: HashMap<String, VecDeque<MockStream>>,
    calls: Vec<RecordedCall>,
}

/// A mock transport for testing
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
    closed_streams: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Mock transport lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Queue a reply for `path`
    pub fn with_reply(self, path: &str, reply: MockReply) -> Self {
        self.push_reply(path, reply);
        self
    }

    /// Queue several replies for `path`, handed out in order
    pub fn with_replies(self, path: &str, replies: Vec<MockReply>) -> Self {
        for reply in replies {
            self.push_reply(path, reply);
        }
        self
    }

    /// Queue a stream for `path`
    pub fn with_stream(self, path: &str, stream: MockStream) -> Self {
        self.push_stream(path, stream);
        self
    }

    pub fn push_reply(&self, path: &str, reply: MockReply) {
        self.lock()
            .replies
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn push_stream(&self, path: &str, stream: MockStream) {
        self.lock()
            .streams
            .entry(path.to_string())
            .or_default()
            .push_back(stream);
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Number of calls (send or open_stream) made to `path`
    pub fn call_count(&self, path: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.request.path == path)
            .count()
    }

    /// Number of stream bodies that have been dropped by their consumer
    pub fn closed_streams(&self) -> usize {
        self.closed_streams.load(Ordering::SeqCst)
    }

    fn record(&self, request: &HttpRequest) {
        self.lock().calls.push(RecordedCall {
            request: request.clone(),
            at: Instant::now(),
        });
    }
}

/// Counts a stream as closed when its body is dropped
struct CloseGuard(Arc<AtomicUsize>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ErrorInfo> {
        self.record(request);
        let reply = self
            .lock()
            .replies
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(MockReply::Response {
                status,
                body,
                delay,
            }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(HttpResponse::new(status, body))
            }
            Some(MockReply::TransportError(message)) => Err(ErrorInfo::transport(message)),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(ErrorInfo::transport(format!(
                "no scripted reply for {}",
                request.path
            ))),
        }
    }

    async fn open_stream(&self, request: &HttpRequest) -> Result<ByteStream, ErrorInfo> {
        self.record(request);
        let script = self
            .lock()
            .streams
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);

        let chunks = match script {
            Some(MockStream::Open(chunks)) => chunks,
            Some(MockStream::Reject(error)) => return Err(error),
            None => {
                return Err(ErrorInfo::transport(format!(
                    "no scripted stream for {}",
                    request.path
                )))
            }
        };

        let guard = CloseGuard(self.closed_streams.clone());
        let body = async_stream::stream! {
            let _guard = guard;
            for chunk in chunks {
                match chunk {
                    MockChunk::Data(bytes) => {
                        yield Ok(bytes);
                    }
                    MockChunk::Delay(delay) => tokio::time::sleep(delay).await,
                    MockChunk::Fail(message) => {
                        yield Err(ErrorInfo::transport(message));
                        break;
                    }
                    MockChunk::Hang => std::future::pending::<()>().await,
                }
            }
        };

        Ok(Box::pin(body))
    }
}
