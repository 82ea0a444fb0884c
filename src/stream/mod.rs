// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming answers: event types, SSE decoding and the session state machine

pub mod event;
pub mod parser;
pub mod session;

pub use event::{Citation, Insight, StreamEvent, Telemetry};
pub use parser::{events, StreamEventParser};
pub use session::{
    fold, Fold, StreamAccumulator, StreamFailure, StreamOutcome, StreamResult, StreamSession,
    StreamState,
};
