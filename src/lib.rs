// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! contract-chat - request lifecycle for a contract-analysis chat client.
//!
//! This crate exposes the core used by the `contract-chat` CLI (`src/main.rs`)
//! and by any other front end that wants to talk to the chat backend.
//!
//! Architecture highlights:
//! - `client`: transport seam (reqwest or scripted mock) and the retrying issuer
//! - `stream`: SSE decoding, event fold and the stream session state machine
//! - `coordinator`: single-flight slots with supersede/commit/clear semantics
//! - `chat`: the `ChatSession` facade and its observable state
//! - `conversation`, `auth`, `config`: message model, session gate, settings

pub mod auth;
pub mod cancel;
pub mod chat;
pub mod cli;
pub mod client;
pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod error;
pub mod outcome;
pub mod stream;

pub use error::{ChatError, Result};
