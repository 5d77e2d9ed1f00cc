//! Session domain model.
//!
//! This module contains the core Session entity that represents
//! a saved unit of conversation in the application's domain layer.

use super::conversation::Conversation;
use super::message::{Attachment, Message, MessageRole};
use crate::{ParleyError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Metadata key reserved for files staged for the next outgoing message.
pub const PENDING_ATTACHMENTS_KEY: &str = "pending_attachments";

/// Name given to sessions created without one.
pub const DEFAULT_SESSION_NAME: &str = "Untitled session";

/// Generates a session id from the current UTC time plus a random suffix.
///
/// Format: `YYYYMMDD-HHMMSS-xxxxxxxx`.
pub fn generate_session_id() -> String {
    let suffix: u32 = rand::thread_rng().r#gen();
    format!("{}-{:08x}", Utc::now().format("%Y%m%d-%H%M%S"), suffix)
}

/// Rejects ids no backend can store under its own name.
///
/// Ids become file names in the filesystem backend, so anything empty,
/// hidden or path-like is refused everywhere to keep backends in step.
///
/// # Errors
///
/// `InvalidArgument` naming the offending id.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\'])
        || id.chars().any(char::is_control)
        || Path::new(id).components().count() != 1
    {
        return Err(ParleyError::invalid_argument(format!(
            "Invalid session id: '{}'",
            id
        )));
    }
    Ok(())
}

/// A saved unit of conversation.
///
/// A session contains:
/// - The conversation transcript (owned exclusively)
/// - Free-form generation overrides (`config`) and `metadata`
/// - Tags for display and search
/// - Branch lineage (`parent_id`, `branch_point`)
///
/// `id` never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub conversation: Conversation,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Session this one was branched from; `None` for a root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Index into the parent's messages at which the branch was forked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_point: Option<usize>,
}

impl Session {
    /// Creates a fresh, unsaved session with an empty conversation.
    pub fn new(name: Option<&str>, model: &str) -> Self {
        let id = generate_session_id();
        let now = Utc::now();
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_SESSION_NAME)
            .to_string();

        Self {
            conversation: Conversation::new(id.clone(), model),
            id,
            name,
            config: BTreeMap::new(),
            created: now,
            updated: now,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            parent_id: None,
            branch_point: None,
        }
    }

    /// Refreshes the `updated` timestamp.
    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn message_count(&self) -> usize {
        self.conversation.messages.len()
    }

    /// Renames the session; blank names are rejected by keeping the old one.
    pub fn rename(&mut self, name: impl Into<String>) {
        let name = name.into();
        let name = name.trim();
        if !name.is_empty() {
            self.name = name.to_string();
            self.touch();
        }
    }

    /// Adds a tag unless it is already present. Returns whether it was added.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into().trim().to_string();
        if tag.is_empty() || self.tags.iter().any(|t| *t == tag) {
            return false;
        }
        self.tags.push(tag);
        self.touch();
        true
    }

    /// Removes a tag. Returns whether it was present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        let removed = self.tags.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Stages an attachment for the next user message.
    pub fn stage_attachment(&mut self, attachment: Attachment) {
        let mut pending = self.pending_attachments();
        pending.push(attachment);
        // Attachment serialization cannot fail: all fields are plain data.
        let value = serde_json::to_value(&pending).unwrap_or(Value::Array(Vec::new()));
        let key = PENDING_ATTACHMENTS_KEY.to_string();
        self.metadata.insert(key, value);
        self.touch();
    }

    /// Attachments staged for the next user message.
    pub fn pending_attachments(&self) -> Vec<Attachment> {
        self.metadata
            .get(PENDING_ATTACHMENTS_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Removes and returns the staged attachments, clearing the reserved key.
    fn take_pending_attachments(&mut self) -> Vec<Attachment> {
        match self.metadata.remove(PENDING_ATTACHMENTS_KEY) {
            Some(value) => match serde_json::from_value(value) {
                Ok(attachments) => attachments,
                Err(e) => {
                    tracing::warn!(
                        "[Session] Dropping unreadable pending attachments for {}: {}",
                        self.id,
                        e
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Appends a message to the conversation.
    ///
    /// A user message consumes any staged attachments.
    pub fn add_message(&mut self, role: MessageRole, content: impl Into<String>) -> &Message {
        let mut message = Message::new(role, content);
        if role == MessageRole::User {
            message.attachments = self.take_pending_attachments();
        }
        self.conversation.push(message);
        self.touch();
        &self.conversation.messages[self.conversation.messages.len() - 1]
    }

    /// Metadata without internal transient keys, for display and export.
    pub fn visible_metadata(&self) -> BTreeMap<String, Value> {
        self.metadata
            .iter()
            .filter(|(k, _)| k.as_str() != PENDING_ATTACHMENTS_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Read-only projection used for listings.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            created: self.created,
            updated: self.updated,
            message_count: self.message_count(),
            tags: self.tags.clone(),
            parent_id: self.parent_id.clone(),
            branch_point: self.branch_point,
        }
    }
}

/// A read-only projection of a session used for listing without transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub message_count: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_point: Option<usize>,
}
