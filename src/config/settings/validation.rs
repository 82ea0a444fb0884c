// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::Duration;

use crate::error::{ChatError, Result};

use super::Settings;

const BASE_URL_ENV: &str = "CONTRACT_CHAT_BASE_URL";

impl Settings {
    /// Get the API token, checking the env var first.
    pub fn get_api_token(&self) -> Option<String> {
        // Priority: env var > config file.
        std::env::var(&self.backend.api_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.backend.api_token.clone())
    }

    /// Get the backend base URL, checking env var first.
    pub fn get_base_url(&self) -> String {
        self.base_url_with(std::env::var(BASE_URL_ENV).ok())
    }

    fn base_url_with(&self, env_override: Option<String>) -> String {
        env_override
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.backend.base_url.clone())
    }

    /// Per-attempt timeout for single-shot requests, if enabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.backend.request_timeout_ms)
    }

    /// Overall timeout for a streaming answer, if enabled.
    pub fn stream_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.backend.stream_timeout_ms)
    }

    /// Reject configurations the client cannot work with.
    ///
    /// The base URL checked is the one requests will use, so an
    /// environment override is validated in place of the file value.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(std::env::var(BASE_URL_ENV).ok())
    }

    fn validate_with(&self, base_url_override: Option<String>) -> Result<()> {
        let overridden = base_url_override
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        let base_url = self.base_url_with(base_url_override);
        let base = base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            let source = if overridden {
                BASE_URL_ENV
            } else {
                "backend.base_url"
            };
            return Err(ChatError::Config(format!(
                "{} must be an http(s) URL, got '{}'",
                source, base_url
            )));
        }

        for (name, path) in [
            ("upload_path", &self.backend.upload_path),
            ("ask_path", &self.backend.ask_path),
            ("stream_path", &self.backend.stream_path),
        ] {
            if !path.starts_with('/') {
                return Err(ChatError::Config(format!(
                    "backend.{} must start with '/', got '{}'",
                    name, path
                )));
            }
        }

        let resilience = &self.resilience;
        if !(0.0..=1.0).contains(&resilience.jitter) {
            return Err(ChatError::Config(format!(
                "resilience.jitter must be between 0.0 and 1.0, got {}",
                resilience.jitter
            )));
        }
        if resilience.max_delay_ms < resilience.base_delay_ms {
            return Err(ChatError::Config(
                "resilience.max_delay_ms must not be smaller than base_delay_ms".to_string(),
            ));
        }
        // 2^63 overflows the backoff computation long before this matters.
        if resilience.max_retries > 32 || resilience.upload_max_retries > 32 {
            return Err(ChatError::Config(
                "retry budgets above 32 are not supported".to_string(),
            ));
        }

        Ok(())
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
