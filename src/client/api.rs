// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat backend endpoints
//!
//! Builds requests for the upload, ask and streaming-ask endpoints and decodes
//! their JSON bodies. Nothing here performs I/O except [`UploadFile::from_path`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::client::transport::{FilePart, HttpRequest, HttpResponse};
use crate::config::settings::{BackendConfig, UserMode};
use crate::error::{ChatError, ErrorInfo, Result};

/// A file to be indexed by the backend
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing the content type from its extension
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ChatError::InvalidInput(format!("not a file: {}", path.display())))?
            .to_string();
        let content_type = content_type_for(path).to_string();
        Ok(Self::new(file_name, content_type, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Body of `POST /upload`
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(alias = "success")]
    pub ok: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<UploadData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub contract_id: String,
    #[serde(default)]
    pub chunks_indexed: u32,
    #[serde(default, alias = "processingTime")]
    pub processing_time_ms: u64,
}

/// A successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub message: String,
    pub data: Option<UploadData>,
}

/// Body of `POST /ask`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest<'a> {
    pub question: &'a str,
    pub has_context: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

/// Body used to open a streaming answer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamAskRequest<'a> {
    pub question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<&'a str>,
    pub mode: UserMode,
}

/// Request builders for the configured endpoints
#[derive(Debug, Clone)]
pub struct ChatApi {
    upload_path: String,
    ask_path: String,
    stream_path: String,
}

impl ChatApi {
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            upload_path: backend.upload_path.clone(),
            ask_path: backend.ask_path.clone(),
            stream_path: backend.stream_path.clone(),
        }
    }

    pub fn upload_path(&self) -> &str {
        &self.upload_path
    }

    pub fn ask_path(&self) -> &str {
        &self.ask_path
    }

    pub fn stream_path(&self) -> &str {
        &self.stream_path
    }

    pub fn upload_request(&self, file: &UploadFile) -> HttpRequest {
        HttpRequest::post_multipart(
            self.upload_path.clone(),
            FilePart {
                field: "file".to_string(),
                file_name: file.file_name.clone(),
                content_type: file.content_type.clone(),
                bytes: file.bytes.clone(),
            },
        )
    }

    pub fn ask_request(&self, question: &str, has_context: bool) -> Result<HttpRequest> {
        let body = serde_json::to_value(AskRequest {
            question,
            has_context,
        })?;
        Ok(HttpRequest::post_json(self.ask_path.clone(), body)
            .with_header("accept", "application/json"))
    }

    pub fn stream_request(
        &self,
        question: &str,
        context_id: Option<&str>,
        mode: UserMode,
    ) -> Result<HttpRequest> {
        let body = serde_json::to_value(StreamAskRequest {
            question,
            context_id,
            mode,
        })?;
        Ok(HttpRequest::post_json(self.stream_path.clone(), body)
            .with_header("accept", "text/event-stream"))
    }
}

/// Decode a successful upload response.
///
/// The backend may answer 2xx with `ok: false`; that is a rejection.
pub fn decode_upload(response: &HttpResponse) -> std::result::Result<UploadReceipt, ErrorInfo> {
    let body: UploadResponse = response.json()?;
    if !body.ok {
        let message = if body.message.trim().is_empty() {
            "Indexing failed".to_string()
        } else {
            body.message
        };
        return Err(ErrorInfo::client_rejection(Some(response.status), message));
    }
    Ok(UploadReceipt {
        message: body.message,
        data: body.data,
    })
}

/// Decode a successful single-shot answer
pub fn decode_answer(response: &HttpResponse) -> std::result::Result<String, ErrorInfo> {
    response.json::<AskResponse>().map(|body| body.answer)
}
