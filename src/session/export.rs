// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Plaintext session exports

use std::fmt;
use std::str::FromStr;

use super::model::Session;
use crate::error::{NexusError, Result};
use crate::llm::message::Role;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Text => "text",
        }
    }

    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::Text => "txt",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "text" | "txt" => Ok(ExportFormat::Text),
            other => Err(NexusError::UnsupportedFormat(format!(
                "unknown export format '{}' (expected json, markdown or text)",
                other
            ))),
        }
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

/// Render `session` in `format`
pub fn render(session: &Session, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(session)?),
        ExportFormat::Markdown => Ok(markdown(session)),
        ExportFormat::Text => Ok(text(session)),
    }
}

fn markdown(session: &Session) -> String {
    let mut lines = vec![
        format!("# Session: {}", session.name),
        String::new(),
        format!("**Created:** {}", session.created_at.to_rfc3339()),
        format!("**Updated:** {}", session.updated_at.to_rfc3339()),
        format!("**Model:** {}", session.model),
        format!("**Provider:** {}", session.provider),
        format!("**Total Tokens:** {}", session.total_tokens),
    ];
    if let Some(prompt) = &session.system_prompt {
        lines.push(format!("**System Prompt:** {}", prompt));
    }
    lines.extend([String::new(), "---".to_string(), String::new()]);

    for message in session.messages() {
        lines.push(format!("## {}", role_label(message.role)));
        lines.push(String::new());
        lines.push(message.content.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

fn text(session: &Session) -> String {
    let mut lines = vec![
        format!("Session: {}", session.name),
        format!("Created: {}", session.created_at.to_rfc3339()),
        format!("Model: {} ({})", session.model, session.provider),
        String::new(),
        "-".repeat(40),
        String::new(),
    ];
    for message in session.messages() {
        lines.push(format!("[{}]", role_label(message.role)));
        lines.push(message.content.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ProviderKind;
    use crate::session::model::Message;

    fn sample() -> Session {
        let mut session = Session::new("notes", ProviderKind::Anthropic, "claude-sonnet-4");
        session.push(Message::user("first question"));
        session.push(Message::assistant("first answer"));
        session.push(Message::user("second question"));
        session
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("MD".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("text".parse::<ExportFormat>().unwrap(), ExportFormat::Text);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(NexusError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_markdown_keeps_order() {
        let out = render(&sample(), ExportFormat::Markdown).unwrap();
        assert!(out.starts_with("# Session: notes"));
        assert!(out.contains("**Provider:** anthropic"));
        let first = out.find("first question").unwrap();
        let answer = out.find("first answer").unwrap();
        let second = out.find("second question").unwrap();
        assert!(first < answer && answer < second);
        assert_eq!(out.matches("## User").count(), 2);
    }

    #[test]
    fn test_text_export() {
        let out = render(&sample(), ExportFormat::Text).unwrap();
        assert!(out.contains("Model: claude-sonnet-4 (anthropic)"));
        assert!(out.contains("[Assistant]\nfirst answer"));
    }

    #[test]
    fn test_json_export_parses_back() {
        let session = sample();
        let out = render(&session, ExportFormat::Json).unwrap();
        let parsed: Session = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, session);
    }
}
