// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::UserMode;

/// contract-chat - ask questions about your contracts
#[derive(Parser, Debug)]
#[command(name = "contract-chat")]
#[command(version, about = "Ask questions about your contracts from the terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question, optionally about a contract uploaded first
    Ask(AskArgs),

    /// Upload a contract for indexing
    Upload(UploadArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct AskArgs {
    /// The question
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub question: Vec<String>,

    /// Upload this contract before asking
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Wait for the full answer instead of streaming it
    #[arg(long)]
    pub single_shot: bool,

    /// Audience the answer is written for
    #[arg(short, long)]
    pub mode: Option<UserModeArg>,
}

impl AskArgs {
    pub fn question_text(&self) -> String {
        self.question.join(" ")
    }
}

#[derive(Parser, Debug)]
pub struct UploadArgs {
    /// Contract file (PDF, DOCX or text)
    pub file: PathBuf,
}

#[derive(Parser, Debug, Default)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective settings (default)
    Show,
    /// Print the settings file path
    Path,
    /// Write default settings if no file exists yet
    Init,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserModeArg {
    /// Plain language
    Laie,
    Business,
    /// Legal terminology
    Jurist,
}

impl From<UserModeArg> for UserMode {
    fn from(mode: UserModeArg) -> Self {
        match mode {
            UserModeArg::Laie => UserMode::Laie,
            UserModeArg::Business => UserMode::Business,
            UserModeArg::Jurist => UserMode::Jurist,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Text,

    /// JSON output
    Json,
}
