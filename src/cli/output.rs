// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Terminal rendering of conversation messages

use crate::conversation::{Message, Role};
use crate::stream::event::Citation;

/// Render one message for the terminal
pub fn render_message(message: &Message) -> String {
    let prefix = match (message.role, message.is_error()) {
        (_, true) => "error",
        (Role::User, _) => "you",
        (Role::Assistant, _) => "assistant",
        (Role::System, _) => "system",
    };
    let mut out = format!("[{}] {}", prefix, message.text);
    if !message.citations.is_empty() {
        out.push('\n');
        out.push_str(&render_citations(&message.citations));
    }
    out
}

pub fn render_citations(citations: &[Citation]) -> String {
    citations
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut line = format!("  [{}] {}", i + 1, c.source_id);
            if let Some(page) = c.page {
                line.push_str(&format!(", p. {}", page));
            }
            if let Some(text) = c.text.as_deref().filter(|t| !t.is_empty()) {
                line.push_str(&format!(": {}", text));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
