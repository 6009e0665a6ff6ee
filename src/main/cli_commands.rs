// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};
use std::path::Path;

use crossterm::tty::IsTty;
use nexus::app::AppContext;
use nexus::chat::display::{
    format_model_item, format_search_hit, format_session_item, format_skipped_entry, is_affirmative,
    print_warning,
};
use nexus::cli::{DefaultArgs, ModelsArgs, SessionsCommand};
use nexus::config::Settings;
use nexus::error::{NexusError, Result};
use nexus::llm::message::Role;
use nexus::llm::model_cache::{ModelListCache, OLLAMA_MODELS_KEY};
use nexus::llm::provider::ProviderKind;
use nexus::llm::providers::OllamaProvider;
use nexus::llm::router::ProviderRouter;

/// Ask a yes/no question on the terminal. Refuses when stdin is not a terminal.
fn confirm(question: &str) -> Result<bool> {
    if !io::stdin().is_tty() {
        return Err(NexusError::InvalidInput(
            "cannot ask for confirmation without a terminal; pass --force".to_string(),
        ));
    }
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}

/// Run `sessions` subcommands
pub(super) async fn run_sessions_command(context: &AppContext, command: SessionsCommand) -> Result<()> {
    let store = context.store();
    match command {
        SessionsCommand::List { recent } => {
            let mut report = store.list().await?;
            if let Some(n) = recent {
                report.sessions.truncate(n);
            }
            if report.sessions.is_empty() {
                println!("No sessions yet. Start one with: nexus chat -s <name> <prompt>");
            }
            for summary in &report.sessions {
                println!("{}", format_session_item(summary));
            }
            for skipped in &report.skipped {
                print_warning(&format_skipped_entry(skipped))?;
            }
        }
        SessionsCommand::Show { name } => {
            let session = store.open(&name).await?;
            println!("Session: {}", session.name);
            println!("Model: {} ({})", session.model, session.provider);
            if let Some(prompt) = &session.system_prompt {
                println!("System: {}", prompt);
            }
            println!();
            for message in session.messages() {
                let label = match message.role {
                    Role::User => "You",
                    Role::Assistant => "Assistant",
                    Role::System => "System",
                };
                println!("[{}] {}\n", label, message.content);
            }
        }
        SessionsCommand::Create {
            name,
            provider,
            model,
            system,
        } => {
            let provider = provider.unwrap_or(context.settings().defaults.provider);
            let model = model.unwrap_or_else(|| context.settings().providers.get(provider).default_model.clone());
            store.create(&name, provider, &model).await?;
            if system.is_some() {
                store.set_system_prompt(&name, system).await?;
            }
            println!("Created session '{}' ({} / {})", name, provider, model);
        }
        SessionsCommand::Delete { name, force } => {
            if !force && !confirm(&format!("Delete session '{}'?", name))? {
                println!("Kept session '{}'", name);
                return Ok(());
            }
            if store.delete(&name).await? {
                println!("Deleted session '{}'", name);
            } else {
                println!("No session named '{}'", name);
            }
        }
        SessionsCommand::Rename { old, new } => {
            store.rename(&old, &new).await?;
            println!("Renamed '{}' to '{}'", old, new);
        }
        SessionsCommand::Search { query, limit } => {
            let hits = store.search(&query).await?;
            if hits.is_empty() {
                println!("No sessions match '{}'", query);
            }
            for hit in hits.iter().take(limit) {
                println!("{}", format_search_hit(hit));
            }
            if hits.len() > limit {
                println!("... {} more (raise --limit to see them)", hits.len() - limit);
            }
        }
        SessionsCommand::Export {
            name,
            format,
            output,
        } => match output {
            Some(path) => {
                let written = store.export_to_file(&name, format, &path).await?;
                println!("Exported '{}' to {}", name, written.display());
            }
            None => println!("{}", store.export(&name, format).await?),
        },
    }
    Ok(())
}

/// Run the `models` command
pub(super) async fn run_models_command(settings: &Settings, args: ModelsArgs) -> Result<()> {
    let router = ProviderRouter::from_settings(settings);
    let registered = router.registered();
    if registered.is_empty() {
        println!("No providers configured. Set an API key or enable Ollama in settings.");
        return Ok(());
    }

    for (kind, model) in router.available_models() {
        if args.provider.map_or(true, |p| p == kind) {
            println!("{}", format_model_item(kind, &model));
        }
    }

    let wants_ollama = args.provider.map_or(true, |p| p == ProviderKind::Ollama);
    if wants_ollama && registered.contains(&ProviderKind::Ollama) {
        let base_url = settings
            .providers
            .ollama
            .base_url
            .clone()
            .unwrap_or_else(|| ProviderKind::Ollama.default_base_url().to_string());
        let provider = OllamaProvider::with_base_url(base_url);
        let listing = ModelListCache::in_home()
            .get_or_fetch(OLLAMA_MODELS_KEY, args.refresh, provider.list_local_models())
            .await;
        match listing {
            Ok(models) if !models.is_empty() => {
                println!("\nInstalled Ollama models:");
                for name in models {
                    println!("  {}", name);
                }
            }
            Ok(_) => {}
            Err(e) => print_warning(&format!("Could not list local Ollama models: {}", e))?,
        }
    }
    Ok(())
}

/// Run the `default` command: print the current default, or set a new one
pub(super) async fn run_default_command(mut settings: Settings, path: &Path, args: DefaultArgs) -> Result<()> {
    let Some(model) = args.model else {
        let (provider, model) = settings.default_selection();
        println!("Default: {}/{}", provider, model);
        return Ok(());
    };

    let catalog = ProviderRouter::from_settings(&settings).available_models();
    let (provider, model) = settings.set_default_model(&model, args.provider, &catalog)?;
    settings.save_to(path).await?;
    println!("Default: {}/{}", provider, model);
    Ok(())
}
