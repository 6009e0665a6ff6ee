// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for Nexus.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::llm::provider::ProviderKind;
use crate::session::ExportFormat;

/// Nexus - one command line for many AI providers
#[derive(Parser, Debug)]
#[command(name = "nexus")]
#[command(version, about = "Unified command-line client for AI providers with encrypted sessions")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Store sessions unencrypted if no encryption key is available
    #[arg(long, global = true)]
    pub allow_plaintext: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt, optionally continuing a saved session
    Chat(ChatArgs),

    /// Manage saved sessions
    #[command(subcommand)]
    Sessions(SessionsCommand),

    /// List models of configured providers
    Models(ModelsArgs),

    /// Show or set the default provider and model
    Default(DefaultArgs),
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Prompt text; piped input is prepended
    #[arg(num_args = 0..)]
    pub prompt: Vec<String>,

    /// Session to continue (created if missing)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Provider to use (openai, anthropic, ollama, openrouter)
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Model to use; `provider/model` picks the provider too
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum tokens in the response
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// System prompt for this exchange
    #[arg(long)]
    pub system: Option<String>,

    /// Wait for the whole response instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Files or directories whose contents are attached to the prompt
    #[arg(short, long = "file")]
    pub files: Vec<PathBuf>,

    /// Allow attaching files that look like credentials
    #[arg(long)]
    pub allow_sensitive: bool,
}

impl ChatArgs {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

/// Session subcommands
#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// List saved sessions
    #[command(alias = "ls")]
    List {
        /// Only the N most recently updated
        #[arg(short, long)]
        recent: Option<usize>,
    },

    /// Print a session's messages
    Show {
        name: String,
    },

    /// Create an empty session
    Create {
        name: String,
        #[arg(short, long)]
        provider: Option<ProviderKind>,
        #[arg(short, long)]
        model: Option<String>,
        /// System prompt stored with the session
        #[arg(long)]
        system: Option<String>,
    },

    /// Delete a session
    #[command(alias = "rm")]
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Rename a session
    #[command(alias = "mv")]
    Rename {
        old: String,
        new: String,
    },

    /// Search session names and message content
    Search {
        query: String,
        /// Maximum number of hits
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Export a session as plaintext
    Export {
        name: String,
        /// json, markdown or text
        #[arg(short, long, default_value = "markdown")]
        format: ExportFormat,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Arguments for the models subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ModelsArgs {
    /// Only show this provider
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Query Ollama again instead of using the cached list
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for the default subcommand
#[derive(clap::Args, Debug, Default)]
pub struct DefaultArgs {
    /// Model to make the default; `provider/model` picks the provider too
    pub model: Option<String>,

    /// Provider the model belongs to
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_args() {
        let cli = Cli::try_parse_from([
            "nexus", "chat", "hello", "world", "-s", "work", "-p", "anthropic", "--no-stream",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.prompt_text(), "hello world");
                assert_eq!(args.session.as_deref(), Some("work"));
                assert_eq!(args.provider, Some(ProviderKind::Anthropic));
                assert!(args.no_stream);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_chat_prompt_may_come_from_pipe() {
        let cli = Cli::try_parse_from(["nexus", "chat", "-f", "src"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert!(args.prompt.is_empty());
                assert_eq!(args.files, vec![PathBuf::from("src")]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(Cli::try_parse_from(["nexus", "chat", "hi", "-p", "bogus"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["nexus", "sessions", "list", "-vv", "--allow-plaintext"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.allow_plaintext);
        assert!(matches!(
            cli.command,
            Commands::Sessions(SessionsCommand::List { recent: None })
        ));
    }

    #[test]
    fn test_list_recent_and_search_limit() {
        let cli = Cli::try_parse_from(["nexus", "sessions", "ls", "--recent", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions(SessionsCommand::List { recent: Some(5) })
        ));

        let cli = Cli::try_parse_from(["nexus", "sessions", "search", "rust"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions(SessionsCommand::Search { limit: 10, .. })
        ));
        let cli = Cli::try_parse_from(["nexus", "sessions", "search", "rust", "-l", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions(SessionsCommand::Search { limit: 3, .. })
        ));
    }

    #[test]
    fn test_default_command() {
        let cli = Cli::try_parse_from(["nexus", "default"]).unwrap();
        match cli.command {
            Commands::Default(args) => {
                assert!(args.model.is_none());
                assert!(args.provider.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["nexus", "default", "llama3.2", "-p", "ollama"]).unwrap();
        match cli.command {
            Commands::Default(args) => {
                assert_eq!(args.model.as_deref(), Some("llama3.2"));
                assert_eq!(args.provider, Some(ProviderKind::Ollama));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_export_format() {
        let cli = Cli::try_parse_from(["nexus", "sessions", "export", "work", "-f", "json"]).unwrap();
        match cli.command {
            Commands::Sessions(SessionsCommand::Export { format, output, .. }) => {
                assert_eq!(format, ExportFormat::Json);
                assert!(output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["nexus", "sessions", "export", "work", "-f", "pdf"]).is_err());
    }

    #[test]
    fn test_rename_alias() {
        let cli = Cli::try_parse_from(["nexus", "sessions", "mv", "a", "b"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions(SessionsCommand::Rename { .. })
        ));
    }
}
