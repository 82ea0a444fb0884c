// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for contract-chat
//!
//! Handles loading and saving settings from ~/.contract-chat/settings.json

use serde::{Deserialize, Serialize};
use std::fmt;

mod io;
mod validation;

/// Main settings structure, stored in ~/.contract-chat/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Backend endpoint configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Retry and resilience settings for API calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Conversation behaviour
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Where and how to reach the chat backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL all endpoint paths are appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,

    /// Bearer token (prefer the environment variable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default = "default_upload_path")]
    pub upload_path: String,

    #[serde(default = "default_ask_path")]
    pub ask_path: String,

    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Per-attempt timeout for single-shot requests (0 disables)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Overall timeout for a streaming answer (0 disables)
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,
}

/// Retry and backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter percentage (0.0 to 1.0) for randomizing delays
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Retry budget for uploads, which are not safe to repeat freely
    #[serde(default = "default_upload_max_retries")]
    pub upload_max_retries: u32,
}

/// Conversation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// How questions are sent to the backend
    #[serde(default)]
    pub mode: AskMode,

    /// Audience the answers are written for
    #[serde(default)]
    pub user_mode: UserMode,

    /// System message a fresh conversation starts with
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
}

/// Transport used for `ask`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AskMode {
    /// One request, one JSON answer
    SingleShot,
    /// Server-sent events folded into an answer
    #[default]
    Streaming,
}

/// Audience level the backend tailors its answer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserMode {
    /// Plain-language answers for non-lawyers
    Laie,
    #[default]
    Business,
    Jurist,
}

impl UserMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserMode::Laie => "laie",
            UserMode::Business => "business",
            UserMode::Jurist => "jurist",
        }
    }
}

impl fmt::Display for UserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token_env: default_api_token_env(),
            api_token: None,
            upload_path: default_upload_path(),
            ask_path: default_ask_path(),
            stream_path: default_stream_path(),
            request_timeout_ms: default_request_timeout_ms(),
            stream_timeout_ms: default_stream_timeout_ms(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            upload_max_retries: default_upload_max_retries(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: AskMode::default(),
            user_mode: UserMode::default(),
            welcome_message: default_welcome_message(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000/api/chat".to_string()
}

fn default_api_token_env() -> String {
    "CONTRACT_CHAT_TOKEN".to_string()
}

fn default_upload_path() -> String {
    "/upload".to_string()
}

fn default_ask_path() -> String {
    "/ask".to_string()
}

fn default_stream_path() -> String {
    "/ask/stream".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_stream_timeout_ms() -> u64 {
    120_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    16000
}

fn default_jitter() -> f64 {
    0.0
}

fn default_upload_max_retries() -> u32 {
    1
}

fn default_welcome_message() -> String {
    "Welcome to Contract AI Chat. Upload a contract to ask questions about it, \
     or ask general legal questions."
        .to_string()
}
