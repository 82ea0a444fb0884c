// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI module for contract-chat
//!
//! Handles command-line argument parsing and terminal output.

pub mod args;
pub mod output;

pub use args::*;
pub use output::{render_citations, render_message};
