// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Transport trait and request/response types
//!
//! Defines the seam between the lifecycle core and the network. Requests are
//! plain, cloneable values so the retrying issuer can send them repeatedly.

use async_trait::async_trait;
use futures::Stream;
use serde::de::DeserializeOwned;
use std::pin::Pin;

use crate::error::ErrorInfo;

/// Main trait for backend transports
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and read the complete response body.
    ///
    /// Only transport failures are returned as `Err`; non-success statuses
    /// come back as a normal [`HttpResponse`] so the caller can classify them.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ErrorInfo>;

    /// Open an incrementally-delivered response body.
    ///
    /// Non-success statuses are classified into an [`ErrorInfo`] here, since
    /// the body is not a stream the caller can consume.
    async fn open_stream(&self, request: &HttpRequest) -> Result<ByteStream, ErrorInfo>;
}

/// Raw body chunks as they arrive from the network
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ErrorInfo>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request addressed relative to the transport's base URL
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path appended to the base URL, e.g. `/ask`
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(FilePart),
}

/// One file in a multipart body
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field name
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::Json(body),
        }
    }

    pub fn post_multipart(path: impl Into<String>, part: FilePart) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::Multipart(part),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A fully-read response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Classify this response as a failure
    pub fn to_error(&self) -> ErrorInfo {
        ErrorInfo::from_status(self.status, &self.body)
    }

    /// Decode the body as JSON; an undecodable body is a protocol error
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ErrorInfo> {
        serde_json::from_str(&self.body).map_err(|e| {
            ErrorInfo::protocol(format!("invalid response body: {}", e))
                .with_status(self.status)
        })
    }
}
