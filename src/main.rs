// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! contract-chat - ask questions about your contracts
//!
//! Entry point for the contract-chat CLI application.

use anyhow::Result;
use clap::Parser;

use contract_chat::cli::{Cli, Commands};
use contract_chat::config::Settings;

#[path = "main/cli_commands.rs"]
mod cli_commands;

use cli_commands::{run_ask, run_config, run_upload};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` enables the lifecycle targets without knowing their names;
    // `RUST_LOG` still takes precedence.
    if cli.verbose > 0 {
        let level = if cli.verbose > 1 { "trace" } else { "debug" };
        for target in [
            "contract_chat.chat",
            "contract_chat.coordinator",
            "contract_chat.retry",
            "contract_chat.stream",
            "contract_chat.http",
        ] {
            if let Ok(parsed) = format!("{}={}", target, level).parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load_from(&settings_path)?;

    match cli.command {
        Commands::Ask(args) => run_ask(args, settings, &cli.format).await,
        Commands::Upload(args) => run_upload(args, settings, &cli.format).await,
        Commands::Config(args) => run_config(args, settings, &settings_path, &cli.format),
    }
}
