// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Display formatting for the command line
//!
//! Formatting functions return strings rather than writing directly to the
//! terminal, making them easy to test. The `print_*` helpers add color.

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};
use std::io::Write;

use crate::llm::provider::{ModelInfo, ProviderKind, Usage};
use crate::session::{MatchKind, SearchHit, SessionSummary, SkippedEntry};

/// Truncate a string for display with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Single-line preview of message text
pub fn preview(s: &str, max_len: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_string(&flat, max_len)
}

/// Format the marker shown when a partially streamed answer is discarded
pub fn format_restart_marker(attempt: u32, reason: &str) -> String {
    format!(
        "[connection interrupted: {}; restarting response (attempt {})]",
        reason,
        attempt + 1
    )
}

/// Format token usage and timing after an answer
pub fn format_usage(usage: Option<&Usage>, duration_ms: Option<u64>, attempts: u32) -> String {
    let mut parts = Vec::new();
    if let Some(usage) = usage {
        parts.push(format!(
            "{} tokens ({} prompt + {} completion)",
            usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
        ));
    }
    if let Some(ms) = duration_ms {
        parts.push(format!("{:.1}s", ms as f64 / 1000.0));
    }
    if attempts > 1 {
        parts.push(format!("{} attempts", attempts));
    }
    parts.join(" | ")
}

/// Format one row of `sessions list`
pub fn format_session_item(summary: &SessionSummary) -> String {
    format!(
        "{:<24} {:<10} {:<28} {:>4} msgs {:>7} tok  {}{}",
        truncate_string(&summary.name, 24),
        summary.provider,
        truncate_string(&summary.model, 28),
        summary.message_count,
        summary.total_tokens,
        summary.updated_at.format("%Y-%m-%d %H:%M"),
        if summary.encrypted { "" } else { "  (plaintext)" }
    )
}

/// Format a session that could not be listed
pub fn format_skipped_entry(skipped: &SkippedEntry) -> String {
    format!("skipped {}: {}", skipped.file_name, skipped.reason)
}

/// Format one search result
pub fn format_search_hit(hit: &SearchHit) -> String {
    let kind = match hit.match_kind {
        MatchKind::Name => "name",
        MatchKind::Content => "content",
    };
    format!(
        "{} [{}] {} msgs, updated {}\n  {}",
        hit.session_name,
        kind,
        hit.message_count,
        hit.updated_at.format("%Y-%m-%d %H:%M"),
        preview(&hit.matched_text, 80)
    )
}

/// Format one row of `models`
pub fn format_model_item(provider: ProviderKind, model: &ModelInfo) -> String {
    format!(
        "{:<11} {:<44} {:<28} {:>8}",
        provider.as_str(),
        model.id,
        model.display_name,
        model.context_window
    )
}

/// Write `text` in `color`, resetting afterwards
pub fn print_colored<W: Write>(out: &mut W, color: Color, text: &str) -> std::io::Result<()> {
    out.execute(SetForegroundColor(color))?;
    write!(out, "{}", text)?;
    out.execute(ResetColor)?;
    Ok(())
}

/// Error line on stderr
pub fn print_error(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    print_colored(&mut stderr, Color::Red, &format!("Error: {}\n", message))
}

/// Warning or marker line on stderr
pub fn print_warning(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    print_colored(&mut stderr, Color::Yellow, &format!("{}\n", message))
}

/// Whether a `[y/N]` answer means yes
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
