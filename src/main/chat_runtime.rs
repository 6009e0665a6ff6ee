// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};

use crossterm::style::Color;
use crossterm::tty::IsTty;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use nexus::app::AppContext;
use nexus::chat::display::{format_restart_marker, format_usage, print_colored, print_warning};
use nexus::chat::{ExchangeEvent, ExchangeRequest, PromptSources};
use nexus::cli::ChatArgs;
use nexus::error::Result;

/// Run one prompt and stream the answer to stdout
pub(super) async fn run_chat(
    context: &AppContext,
    args: ChatArgs,
    cancel: CancellationToken,
    verbose: u8,
) -> Result<()> {
    let sources = PromptSources {
        prompt: args.prompt_text(),
        attachments: args.files.clone(),
        allow_sensitive: args.allow_sensitive,
        max_bytes: context.settings().sessions.max_payload_bytes,
    };
    let piped = (!io::stdin().is_tty()).then(tokio::io::stdin);
    let prompt = sources.assemble(piped).await?;

    let request = ExchangeRequest {
        session: args.session.clone(),
        prompt,
        provider: args.provider,
        model: args.model.clone(),
        system: args.system.clone(),
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        stream: args.no_stream.then_some(false),
    };

    let mut stdout = io::stdout();
    let mut events = context.engine().send(request, cancel);
    let mut mid_line = false;

    while let Some(event) = events.next().await {
        match event? {
            ExchangeEvent::Delta(text) => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
                mid_line = !text.ends_with('\n');
            }
            ExchangeEvent::Restarted { attempt, reason } => {
                if mid_line {
                    writeln!(stdout)?;
                    mid_line = false;
                }
                print_warning(&format_restart_marker(attempt, &reason))?;
            }
            ExchangeEvent::Completed(completion) => {
                if mid_line {
                    writeln!(stdout)?;
                    mid_line = false;
                }
                if verbose > 0 {
                    let line = format_usage(completion.usage.as_ref(), None, completion.attempts);
                    if !line.is_empty() {
                        let mut stderr = io::stderr();
                        print_colored(
                            &mut stderr,
                            Color::DarkGrey,
                            &format!("[{} {}] {}\n", completion.provider, completion.model, line),
                        )?;
                    }
                }
            }
            ExchangeEvent::Saved(session) => {
                if verbose > 0 && !session.is_temp() {
                    eprintln!(
                        "[saved to '{}', {} messages]",
                        session.name,
                        session.message_count()
                    );
                }
            }
        }
    }
    Ok(())
}
