// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming answer sessions
//!
//! A [`StreamSession`] opens one event channel, folds the decoded events into
//! a [`StreamAccumulator`] and resolves to exactly one terminal outcome. The
//! fold itself is the pure function [`fold`]; the session only adds I/O,
//! cancellation and the state machine around it.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cancel::Deadline;
use crate::client::transport::{HttpRequest, Transport};
use crate::error::{ChatError, ErrorInfo, Result};
use crate::outcome::Outcome;
use crate::stream::event::{Citation, Insight, StreamEvent, Telemetry};
use crate::stream::parser::events;

/// Lifecycle of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Starting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Failed | StreamState::Cancelled
        )
    }
}

/// Partial result of a stream in progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamAccumulator {
    answer: String,
    citations: Vec<Citation>,
    insights: Vec<Insight>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn insights(&self) -> &[Insight] {
        &self.insights
    }
}

/// A completed stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub insights: Vec<Insight>,
    pub telemetry: Option<Telemetry>,
}

/// A failed stream. `partial_answer` is what had arrived before the failure;
/// it is never presented as an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFailure {
    pub error: ErrorInfo,
    pub partial_answer: String,
}

impl StreamFailure {
    pub fn new(error: ErrorInfo) -> Self {
        Self {
            error,
            partial_answer: String::new(),
        }
    }
}

/// Result of folding one event
#[derive(Debug, Clone, PartialEq)]
pub enum Fold {
    Continue(StreamAccumulator),
    Completed(StreamResult),
    Failed(StreamFailure),
}

/// Fold one event into the accumulator
pub fn fold(mut acc: StreamAccumulator, event: StreamEvent) -> Fold {
    match event {
        StreamEvent::Progress { .. } => Fold::Continue(acc),
        StreamEvent::Chunk(text) => {
            acc.answer.push_str(&text);
            Fold::Continue(acc)
        }
        StreamEvent::Insights(insights) => {
            acc.insights.extend(insights);
            Fold::Continue(acc)
        }
        StreamEvent::Citations(citations) => {
            acc.citations = citations;
            Fold::Continue(acc)
        }
        StreamEvent::Error(error) => Fold::Failed(StreamFailure {
            error,
            partial_answer: acc.answer,
        }),
        StreamEvent::Done { answer, telemetry } => Fold::Completed(StreamResult {
            // The server's final answer is authoritative over the chunks.
            answer: answer.unwrap_or(acc.answer),
            citations: acc.citations,
            insights: acc.insights,
            telemetry,
        }),
    }
}

pub type StreamOutcome = Outcome<StreamResult, StreamFailure>;

/// One streaming call
pub struct StreamSession {
    transport: Arc<dyn Transport>,
    token: CancellationToken,
    timeout: Option<Duration>,
    state: StreamState,
}

impl StreamSession {
    /// Create a session cancelled by `token`
    pub fn new(transport: Arc<dyn Transport>, token: CancellationToken) -> Self {
        Self {
            transport,
            token,
            timeout: None,
            state: StreamState::Idle,
        }
    }

    /// Bound the whole stream; expiry is a transport failure
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Open the channel and run it to a terminal outcome.
    ///
    /// Only valid from `Idle`; any other state is a contract violation.
    pub async fn start(&mut self, request: &HttpRequest) -> Result<StreamOutcome> {
        if self.state != StreamState::Idle {
            return Err(ChatError::Session(format!(
                "stream session cannot start from {:?}",
                self.state
            )));
        }

        self.state = StreamState::Starting;
        let deadline = Deadline::after(&self.token, self.timeout);
        let outcome = self.run(request, &deadline).await;

        self.state = match &outcome {
            Outcome::Success(_) => StreamState::Completed,
            Outcome::Failed(_) => StreamState::Failed,
            Outcome::Cancelled => StreamState::Cancelled,
        };
        tracing::debug!(
            target: "contract_chat.stream",
            path = %request.path,
            state = ?self.state,
            "stream finished"
        );
        Ok(outcome)
    }

    async fn run(&mut self, request: &HttpRequest, deadline: &Deadline) -> StreamOutcome {
        if deadline.token().is_cancelled() {
            return self.interrupted(deadline, String::new());
        }

        let opened = tokio::select! {
            biased;
            _ = deadline.token().cancelled() => return self.interrupted(deadline, String::new()),
            opened = self.transport.open_stream(request) => opened,
        };
        let body = match opened {
            Ok(body) => body,
            Err(error) => {
                tracing::debug!(target: "contract_chat.stream", %error, "stream rejected");
                return Outcome::Failed(StreamFailure::new(error));
            }
        };

        let mut frames = Box::pin(events(body));
        let mut acc = StreamAccumulator::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = deadline.token().cancelled() => None,
                next = frames.next() => Some(next),
            };
            let event = match next {
                // Interrupted: the channel is closed when `frames` drops.
                None => return self.interrupted(deadline, acc.answer),
                Some(Some(event)) => event,
                Some(None) => {
                    return Outcome::Failed(StreamFailure {
                        error: ErrorInfo::transport("stream ended before completion"),
                        partial_answer: acc.answer,
                    })
                }
            };

            if self.state == StreamState::Starting {
                self.state = StreamState::Streaming;
            }
            if let StreamEvent::Progress {
                stage, progress, ..
            } = &event
            {
                tracing::debug!(target: "contract_chat.stream", %stage, ?progress, "progress");
            }

            acc = match fold(acc, event) {
                Fold::Continue(acc) => acc,
                Fold::Completed(result) => return Outcome::Success(result),
                Fold::Failed(failure) => return Outcome::Failed(failure),
            };
        }
    }

    fn interrupted(&self, deadline: &Deadline, partial_answer: String) -> StreamOutcome {
        if deadline.expired() && !self.token.is_cancelled() {
            let timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
            tracing::warn!(target: "contract_chat.stream", timeout_ms, "stream timed out");
            Outcome::Failed(StreamFailure {
                error: ErrorInfo::transport(format!("stream timed out after {}ms", timeout_ms)),
                partial_answer,
            })
        } else {
            Outcome::Cancelled
        }
    }
}
