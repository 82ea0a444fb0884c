// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use contract_chat::auth::StaticSession;
use contract_chat::chat::{ChatSession, Settled};
use contract_chat::cli::{
    render_message, AskArgs, ConfigAction, ConfigArgs, OutputFormat, UploadArgs,
};
use contract_chat::client::UploadFile;
use contract_chat::config::{AskMode, Settings};
use contract_chat::conversation::Message;

/// Build a session for one CLI invocation. Whoever holds the API token is
/// treated as a signed-in premium user; the backend enforces the real tier.
fn build_session(settings: Settings, args: Option<&AskArgs>) -> Result<ChatSession> {
    let mut builder =
        ChatSession::builder(settings).with_auth(Arc::new(StaticSession::premium()));
    if let Some(args) = args {
        if args.single_shot {
            builder = builder.with_mode(AskMode::SingleShot);
        }
        if let Some(mode) = args.mode {
            builder = builder.with_user_mode(mode.into());
        }
    }
    Ok(builder.build()?)
}

fn print_settled(session: &ChatSession, settled: Settled, format: &OutputFormat) -> Result<()> {
    let Some(id) = settled.message_id() else {
        eprintln!("Cancelled.");
        return Ok(());
    };
    let message = session
        .messages()
        .into_iter()
        .find(|m| m.id == id)
        .context("settled message is missing from the conversation")?;

    if let Settled::Failed(_) = settled {
        if *format == OutputFormat::Json {
            print_message(&message, format)?;
        }
        bail!("{}", message.text);
    }
    print_message(&message, format)
}

fn print_message(message: &Message, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", render_message(message)),
        OutputFormat::Json => println!("{}", serde_json::to_string(message)?),
    }
    Ok(())
}

async fn upload_file(session: &ChatSession, path: &Path, format: &OutputFormat) -> Result<()> {
    let file = UploadFile::from_path(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let settled = session.upload(file).await?;
    print_settled(session, settled, format)
}

pub async fn run_upload(args: UploadArgs, settings: Settings, format: &OutputFormat) -> Result<()> {
    let session = build_session(settings, None)?;
    upload_file(&session, &args.file, format).await
}

pub async fn run_ask(args: AskArgs, settings: Settings, format: &OutputFormat) -> Result<()> {
    let session = build_session(settings, Some(&args))?;

    if let Some(path) = &args.file {
        upload_file(&session, path, format).await?;
    }

    // Ctrl-C cancels the ask; the cancelled ask leaves no message behind.
    let canceller = session.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel_ask();
        }
    });

    let settled = session.ask(&args.question_text()).await;
    ctrl_c.abort();

    print_settled(&session, settled?, format)
}

pub fn run_config(
    args: ConfigArgs,
    settings: Settings,
    path: &Path,
    format: &OutputFormat,
) -> Result<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init => {
            if path.exists() {
                println!("Settings already exist at {}", path.display());
            } else {
                settings.save_to(path)?;
                println!("Wrote default settings to {}", path.display());
            }
        }
        ConfigAction::Show => {
            let mut shown = settings.clone();
            if shown.backend.api_token.is_some() {
                shown.backend.api_token = Some("********".to_string());
            }
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string(&shown)?),
                OutputFormat::Text => {
                    println!("# {}", path.display());
                    println!("{}", serde_json::to_string_pretty(&shown)?);
                    println!("# effective base URL: {}", settings.get_base_url());
                }
            }
        }
    }
    Ok(())
}
