// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation messages
//!
//! An ordered, append-only list of messages with at most one in-flight
//! streaming placeholder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ChatError, ErrorInfo, Result};
use crate::stream::event::Citation;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Unique message id, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
    /// True while this is the placeholder of a streaming answer
    #[serde(default)]
    pub streaming: bool,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            text: text.into(),
            created_at: Utc::now(),
            citations: Vec::new(),
            error_info: None,
            streaming: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>, citations: Vec<Citation>) -> Self {
        let mut message = Self::new(Role::Assistant, text);
        message.citations = citations;
        message
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// A system message reporting a failure
    pub fn error(info: ErrorInfo) -> Self {
        let mut message = Self::new(Role::System, info.user_reason());
        message.error_info = Some(info);
        message
    }

    pub fn placeholder() -> Self {
        let mut message = Self::new(Role::Assistant, "");
        message.streaming = true;
        message
    }

    pub fn is_error(&self) -> bool {
        self.error_info.is_some()
    }
}

/// Ordered message list
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    in_flight: Option<MessageId>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The streaming placeholder, if one is in flight
    pub fn in_flight(&self) -> Option<MessageId> {
        self.in_flight
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn push(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Append an empty streaming placeholder
    pub fn push_placeholder(&mut self) -> Result<MessageId> {
        if let Some(existing) = self.in_flight {
            return Err(ChatError::Session(format!(
                "message {} is already in flight",
                existing
            )));
        }
        let id = self.push(Message::placeholder());
        self.in_flight = Some(id);
        Ok(id)
    }

    /// Fill in the placeholder `id` and make it immutable.
    /// Returns false if `id` is not the in-flight placeholder.
    pub fn finalize_placeholder(
        &mut self,
        id: MessageId,
        text: String,
        citations: Vec<Citation>,
    ) -> bool {
        if self.in_flight != Some(id) {
            return false;
        }
        self.in_flight = None;
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.text = text;
                message.citations = citations;
                message.streaming = false;
                true
            }
            None => false,
        }
    }

    /// Remove the placeholder `id` if it is still in flight
    pub fn discard_placeholder(&mut self, id: MessageId) -> bool {
        if self.in_flight != Some(id) {
            return false;
        }
        self.in_flight = None;
        self.messages.retain(|m| m.id != id);
        true
    }

    /// Remove whatever placeholder is in flight
    pub fn discard_in_flight(&mut self) -> Option<MessageId> {
        let id = self.in_flight?;
        self.discard_placeholder(id);
        Some(id)
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.in_flight = None;
    }

    /// Text of the most recent user message
    pub fn last_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.as_str())
    }
}
