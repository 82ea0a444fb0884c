// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session management
//!
//! The facade the rest of the program talks to: upload a contract, ask
//! questions about it, cancel, and observe the conversation.

mod session;

pub use session::{ChatSession, ChatSessionBuilder, ChatState, Settled};
