// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Nexus - unified command line for AI providers
//!
//! Entry point for the Nexus CLI application.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use nexus::app::{AppContext, EncryptionChoice};
use nexus::chat::display::{print_error, print_warning};
use nexus::cli::{Cli, Commands};
use nexus::config::Settings;
use nexus::error::{NexusError, Result};

#[path = "main/chat_runtime.rs"]
mod chat_runtime;
#[path = "main/cli_commands.rs"]
mod cli_commands;

use chat_runtime::run_chat;
use cli_commands::{run_default_command, run_models_command, run_sessions_command};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on debug output for our own targets; `RUST_LOG` still applies.
    if cli.verbose > 0 {
        for directive in ["nexus=debug", "nexus.session.store=debug", "nexus.llm.router=debug"] {
            if let Ok(parsed) = directive.parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(NexusError::Cancelled) => {
            let _ = print_warning("Cancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            let _ = print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load settings
    let settings_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load_from(&settings_path)?;
    settings.ensure_directories()?;

    let choice = if cli.allow_plaintext {
        EncryptionChoice::AllowPlaintext
    } else {
        EncryptionChoice::RequireKey
    };

    match cli.command {
        Commands::Models(args) => run_models_command(&settings, args).await,
        Commands::Default(args) => run_default_command(settings, &settings_path, args).await,
        Commands::Sessions(command) => {
            let context = AppContext::initialize(settings, choice).await?;
            run_sessions_command(&context, command).await
        }
        Commands::Chat(args) => {
            let context = AppContext::initialize(settings, choice).await?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            run_chat(&context, args, cancel, cli.verbose).await
        }
    }
}
