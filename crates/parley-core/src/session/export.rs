//! Session export renderers (JSON dump and Markdown transcript).

use super::model::{PENDING_ATTACHMENTS_KEY, Session};
use crate::error::{ParleyError, Result};
use std::fmt::Write as _;
use std::str::FromStr;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    /// Conventional file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }

    /// Renders the session in this format.
    pub fn render(&self, session: &Session) -> Result<String> {
        match self {
            ExportFormat::Json => render_json(session),
            ExportFormat::Markdown => Ok(render_markdown(session)),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(ParleyError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Full structured dump with internal metadata keys removed.
pub fn render_json(session: &Session) -> Result<String> {
    let mut value = serde_json::to_value(session)?;
    if let Some(metadata) = value.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        metadata.remove(PENDING_ATTACHMENTS_KEY);
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Human-readable transcript.
pub fn render_markdown(session: &Session) -> String {
    let mut out = String::new();

    // Writing to a String is infallible
    let _ = writeln!(out, "# Session: {}", session.name);
    let _ = writeln!(out);
    let _ = writeln!(out, "ID: {}", session.id);
    let _ = writeln!(out, "Created: {}", session.created.to_rfc3339());
    let _ = writeln!(out, "Updated: {}", session.updated.to_rfc3339());
    if !session.tags.is_empty() {
        let _ = writeln!(out, "Tags: {}", session.tags.join(", "));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "## Conversation");

    for message in &session.conversation.messages {
        let _ = writeln!(out);
        let _ = writeln!(out, "### {}", message.role.title());
        let _ = writeln!(out);
        let _ = writeln!(out, "*{}*", message.timestamp.to_rfc3339());
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", message.content);

        if !message.attachments.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Attachments:");
            for attachment in &message.attachments {
                let _ = writeln!(out, "- {} ({})", attachment.name, attachment.mime_type);
            }
        }
    }

    out
}
