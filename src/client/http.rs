// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! reqwest-backed transport
//!
//! Implements the Transport trait against the real chat backend.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use crate::client::transport::{
    ByteStream, FilePart, HttpRequest, HttpResponse, Method, RequestBody, Transport,
};
use crate::config::Settings;
use crate::error::{ErrorInfo, Result};

/// HTTP transport for the chat backend
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_token: None,
        }
    }

    /// Send a bearer token with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.api_token = token;
        self
    }

    /// Build from settings (base URL and token honour env overrides)
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("contract-chat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.get_base_url(),
            api_token: settings.get_api_token(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn build(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(part) => builder.multipart(multipart_form(part)),
        }
    }

    async fn execute(&self, request: &HttpRequest) -> std::result::Result<reqwest::Response, ErrorInfo> {
        tracing::debug!(
            target: "contract_chat.http",
            path = %request.path,
            "sending request"
        );
        self.build(request)
            .send()
            .await
            .map_err(|e| ErrorInfo::transport(describe(&e)))
    }
}

fn multipart_form(file: &FilePart) -> Form {
    let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
    // An unparsable content type falls back to reqwest's default.
    let part = match part.mime_str(&file.content_type) {
        Ok(part) => part,
        Err(_) => Part::bytes(file.bytes.clone()).file_name(file.file_name.clone()),
    };
    Form::new().part(file.field.clone(), part)
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, ErrorInfo> {
        let response = self.execute(request).await?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ErrorInfo::transport(format!("failed to read response: {}", e)))?;
        Ok(HttpResponse::new(status, body))
    }

    async fn open_stream(&self, request: &HttpRequest) -> std::result::Result<ByteStream, ErrorInfo> {
        let response = self.execute(request).await?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorInfo::from_status(status, &body));
        }

        let body = response.bytes_stream().map(|result| {
            result
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ErrorInfo::transport(format!("stream read failed: {}", e)))
        });

        Ok(Box::pin(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let transport = HttpTransport::new("http://localhost:5000/api/chat/");
        assert_eq!(
            transport.url("/ask"),
            "http://localhost:5000/api/chat/ask"
        );
    }

    #[test]
    fn test_from_settings_uses_configured_base() {
        let mut settings = Settings::default();
        settings.backend.base_url = "https://chat.example.com".to_string();
        settings.backend.api_token_env = "CONTRACT_CHAT_TEST_UNSET_TOKEN_9182".to_string();
        let transport = HttpTransport::from_settings(&settings).unwrap();
        // CONTRACT_CHAT_BASE_URL may override in a developer shell.
        if std::env::var("CONTRACT_CHAT_BASE_URL").is_err() {
            assert_eq!(transport.base_url(), "https://chat.example.com");
        }
        assert!(transport.api_token.is_none());
    }
}
