// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for contract-chat
//!
//! `ChatError` covers crate-level failures (configuration, IO, contract
//! violations). `ErrorInfo` is the failure value carried by request and
//! stream outcomes; it is what ends up rendered in an error message.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for contract-chat operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// A request or stream failed
    #[error("Request failed: {0}")]
    Request(#[from] ErrorInfo),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Session contract violations (e.g. starting a stream session twice)
    #[error("Session error: {0}")]
    Session(String),
}

/// Result type alias for contract-chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Failure classes a request or stream can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection failed before a response arrived, or the channel broke
    Transport,
    /// The server rejected the request as invalid or unauthorized (4xx)
    ClientRejection,
    /// Transient server-side failure (5xx) or an error reported mid-stream
    Server,
    /// Malformed response body or stream frame
    Protocol,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::ClientRejection => "client rejection",
            ErrorKind::Server => "server",
            ErrorKind::Protocol => "protocol",
        };
        f.write_str(label)
    }
}

/// Describes why an operation failed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    /// HTTP status, when the failure came from a response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    /// Number of network attempts made before giving up (0 if none were made)
    #[serde(default)]
    pub attempts: u32,
    /// True when the issuer gave up after exhausting its retry budget
    #[serde(default)]
    pub exhausted: bool,
}

impl ErrorInfo {
    fn new(kind: ErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            attempts: 0,
            exhausted: false,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, None, message)
    }

    pub fn client_rejection(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClientRejection, status, message)
    }

    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, status, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, None, message)
    }

    /// Classify a non-success HTTP response.
    ///
    /// The message is taken from a JSON `message` (or `error`) field when the
    /// body carries one, otherwise it falls back to `HTTP <status>`.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| format!("HTTP {}", status));
        match status {
            400..=499 => Self::client_rejection(Some(status), message),
            500..=599 => Self::server(Some(status), message),
            _ => Self::new(ErrorKind::Protocol, Some(status), message),
        }
    }

    /// Attach the HTTP status the failure came from
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Record how many attempts were made
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Mark as "gave up after exhausting retries"
    pub fn exhausted(mut self) -> Self {
        self.exhausted = true;
        self
    }

    /// Human-readable reason for an error message
    pub fn user_reason(&self) -> String {
        if self.exhausted && self.attempts > 1 {
            format!("{} (gave up after {} attempts)", self.message, self.attempts)
        } else {
            self.message.clone()
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
