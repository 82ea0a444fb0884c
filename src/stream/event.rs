// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Typed events of a streaming answer

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorInfo;

/// A reference into the indexed contract backing part of an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    #[serde(alias = "id")]
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Citation {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            page: None,
            span: None,
            text: None,
            score: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// A structured finding (party, amount, deadline, risk, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(default, alias = "kind")]
    pub category: String,
    /// Everything else the backend attached
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Insight {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

/// Timing and token counts reported with a completed answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Telemetry {
    pub retrieval_ms: Option<u64>,
    pub intent_ms: Option<u64>,
    pub tools_ms: Option<u64>,
    pub generation_ms: Option<u64>,
    pub total_latency: Option<u64>,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub citations_count: Option<u64>,
}

/// One decoded frame of a streaming answer
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Backend progress report; informational only
    Progress {
        stage: String,
        progress: Option<f64>,
        message: Option<String>,
    },
    /// Next piece of answer text
    Chunk(String),
    Insights(Vec<Insight>),
    /// Full citation set; replaces any earlier one
    Citations(Vec<Citation>),
    /// Terminal failure
    Error(ErrorInfo),
    /// Terminal success, optionally with the authoritative answer
    Done {
        answer: Option<String>,
        telemetry: Option<Telemetry>,
    },
}

impl StreamEvent {
    /// True for `Done` and `Error`; nothing follows a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Chunk(_) => "chunk",
            StreamEvent::Insights(_) => "insights",
            StreamEvent::Citations(_) => "citations",
            StreamEvent::Error(_) => "error",
            StreamEvent::Done { .. } => "done",
        }
    }
}
