// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Server-sent event decoding
//!
//! Turns the raw body of a streaming answer into [`StreamEvent`]s. Bytes are
//! buffered until a complete frame (terminated by a blank line) is available,
//! so frames and UTF-8 sequences split across reads decode correctly.

use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::client::transport::ByteStream;
use crate::error::ErrorInfo;
use crate::stream::event::{Citation, Insight, StreamEvent, Telemetry};

const FRAME_END: &[u8] = b"\n\n";

/// Incremental decoder for one channel
#[derive(Debug, Default)]
pub struct StreamEventParser {
    buffer: Vec<u8>,
    /// Bytes before this offset are known not to start a frame terminator
    scanned: usize,
    finished: bool,
}

impl StreamEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a terminal event has been produced
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed bytes as they arrive
    pub fn push(&mut self, bytes: &[u8]) {
        if self.finished {
            return;
        }
        // CR never appears inside a UTF-8 multi-byte sequence.
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
    }

    /// Next event from the buffered frames, if a complete one is available
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        while !self.finished {
            let end = match find(&self.buffer[self.scanned..], FRAME_END) {
                Some(offset) => self.scanned + offset,
                None => {
                    self.scanned = self.buffer.len().saturating_sub(FRAME_END.len() - 1);
                    return None;
                }
            };
            let frame: Vec<u8> = self.buffer.drain(..end + FRAME_END.len()).collect();
            self.scanned = 0;
            if let Some(event) = self.decode(&frame[..end]) {
                return Some(event);
            }
        }
        None
    }

    /// The channel ended. Returns a trailing unterminated frame's event, if
    /// any, and a transport error when no terminal event was seen.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if !rest.iter().all(u8::is_ascii_whitespace) {
            if let Some(event) = self.decode(&rest) {
                events.push(event);
            }
        }
        if !self.finished {
            self.finished = true;
            events.push(StreamEvent::Error(ErrorInfo::transport(
                "stream ended before completion",
            )));
        }
        events
    }

    /// The channel broke
    pub fn fail(&mut self, error: ErrorInfo) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.buffer.clear();
        self.scanned = 0;
        Some(StreamEvent::Error(error))
    }

    fn decode(&mut self, frame: &[u8]) -> Option<StreamEvent> {
        let event = match std::str::from_utf8(frame) {
            Ok(text) => parse_frame(text)?,
            Err(e) => StreamEvent::Error(ErrorInfo::protocol(format!(
                "stream frame is not valid UTF-8: {}",
                e
            ))),
        };
        if event.is_terminal() {
            self.finished = true;
            self.buffer.clear();
            self.scanned = 0;
        }
        Some(event)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Deserialize)]
struct ProgressData {
    #[serde(default)]
    stage: String,
    progress: Option<f64>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ChunkData {
    text: String,
}

#[derive(Deserialize)]
struct InsightsData {
    insights: Vec<Insight>,
}

#[derive(Deserialize)]
struct CitationsData {
    citations: Vec<Citation>,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(default)]
    message: String,
    #[serde(default)]
    recoverable: bool,
}

#[derive(Deserialize)]
struct DoneData {
    answer: Option<String>,
    telemetry: Option<Telemetry>,
}

/// Parse one complete frame. `None` means the frame carries no event.
pub fn parse_frame(frame: &str) -> Option<StreamEvent> {
    let mut event_type: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event_type = Some(value.trim()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    let event_type = event_type.unwrap_or("message");
    let data = data_lines.join("\n");
    let data = if data.trim().is_empty() { "{}" } else { data.as_str() };

    match event_type {
        "connected" | "heartbeat" | "close" => None,
        "progress" => Some(decode::<ProgressData>(event_type, data, |p| {
            StreamEvent::Progress {
                stage: p.stage,
                progress: p.progress,
                message: p.message,
            }
        })),
        "chunk" => Some(decode::<ChunkData>(event_type, data, |c| {
            StreamEvent::Chunk(c.text)
        })),
        "insights" => Some(decode::<InsightsData>(event_type, data, |i| {
            StreamEvent::Insights(i.insights)
        })),
        "citations" => Some(decode::<CitationsData>(event_type, data, |c| {
            StreamEvent::Citations(c.citations)
        })),
        "error" => Some(decode::<ErrorData>(event_type, data, |e| {
            let message = if e.message.trim().is_empty() {
                "stream failed".to_string()
            } else {
                e.message
            };
            tracing::debug!(
                target: "contract_chat.stream",
                recoverable = e.recoverable,
                "server reported stream error"
            );
            StreamEvent::Error(ErrorInfo::server(None, message))
        })),
        "complete" | "done" => Some(decode::<DoneData>(event_type, data, |d| {
            StreamEvent::Done {
                answer: d.answer,
                telemetry: d.telemetry,
            }
        })),
        other => {
            tracing::debug!(target: "contract_chat.stream", event = other, "skipping unknown event");
            None
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(
    event_type: &str,
    data: &str,
    into: impl FnOnce(T) -> StreamEvent,
) -> StreamEvent {
    match serde_json::from_str::<T>(data) {
        Ok(payload) => into(payload),
        Err(e) => StreamEvent::Error(ErrorInfo::protocol(format!(
            "malformed {} event: {}",
            event_type, e
        ))),
    }
}

/// Decode a byte channel into a finite, ordered event sequence.
///
/// The sequence ends after the first terminal event. A channel failure or a
/// channel that ends without a terminal frame ends it with a transport error.
pub fn events(mut body: ByteStream) -> impl Stream<Item = StreamEvent> + Send {
    async_stream::stream! {
        let mut parser = StreamEventParser::new();
        'read: loop {
            while let Some(event) = parser.next_event() {
                yield event;
            }
            if parser.is_finished() {
                break 'read;
            }

            match body.next().await {
                Some(Ok(bytes)) => parser.push(&bytes),
                Some(Err(error)) => {
                    if let Some(event) = parser.fail(error) {
                        yield event;
                    }
                    break 'read;
                }
                None => {
                    for event in parser.finish() {
                        yield event;
                    }
                    break 'read;
                }
            }
        }
    }
}
