//! Search domain models.

use crate::session::{MessageRole, SessionInfo};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Which part of a session produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchType {
    Message,
    Name,
    SystemPrompt,
    Tag,
}

/// A single match location inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub match_type: MatchType,
    /// Speaking role, for message matches only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Index of the message in the transcript, for message matches only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_index: Option<usize>,
    /// The full matched field
    pub content: String,
    /// Bounded context around the match, trimmed at word boundaries
    pub snippet: String,
    /// Character offset of the match within `content`
    pub position: usize,
}

/// All matches for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSearchResult {
    pub session: SessionInfo,
    pub matches: Vec<SearchMatch>,
}
