//! Folding one session's transcript into another.

use crate::session::Session;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;

/// Message metadata key recording which session a merged message came from.
pub const MERGED_FROM_KEY: &str = "merged_from";

/// Result of [`merge_sessions`].
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The combined session; `current` itself is never modified.
    pub merged: Session,
    pub appended: usize,
    /// Source messages already present in the current transcript
    pub skipped: usize,
}

/// Appends `source`'s messages after `current`'s, skipping any whose id the
/// current transcript already holds.
///
/// Branches keep the message ids of the prefix they were forked from, so
/// merging a branch back into its parent (or the reverse) adds only the
/// messages that diverged. Appended messages keep their content, timestamps
/// and attachments and are tagged with `merged_from = <source id>`.
pub fn merge_sessions(current: &Session, source: &Session) -> MergeOutcome {
    let mut merged = current.clone();
    let existing: HashSet<&str> = current
        .conversation
        .messages
        .iter()
        .map(|m| m.id.as_str())
        .collect();

    let mut appended = 0;
    let mut skipped = 0;
    for message in &source.conversation.messages {
        if existing.contains(message.id.as_str()) {
            skipped += 1;
            continue;
        }
        let mut copy = message.clone();
        let from = Value::String(source.id.clone());
        copy.metadata.insert(MERGED_FROM_KEY.to_string(), from);
        merged.conversation.messages.push(copy);
        appended += 1;
    }

    if appended > 0 {
        let now = Utc::now();
        merged.conversation.updated = now;
        merged.updated = now;
    }

    MergeOutcome {
        merged,
        appended,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::fork;
    use crate::session::MessageRole;

    fn session_with(name: &str, messages: &[&str]) -> Session {
        let mut session = Session::new(Some(name), "gpt-4o");
        for m in messages {
            session.add_message(MessageRole::User, *m);
        }
        session
    }

    #[test]
    fn test_merge_unrelated_appends_everything() {
        let current = session_with("current", &["a", "b"]);
        let source = session_with("source", &["x", "y", "z"]);

        let outcome = merge_sessions(&current, &source);

        assert_eq!(outcome.appended, 3);
        assert_eq!(outcome.skipped, 0);
        let contents: Vec<&str> = outcome
            .merged
            .conversation
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["a", "b", "x", "y", "z"]);
        assert_eq!(
            outcome.merged.conversation.messages[2].metadata[MERGED_FROM_KEY],
            Value::String(source.id.clone())
        );
        // Input untouched
        assert_eq!(current.conversation.messages.len(), 2);
    }

    #[test]
    fn test_merge_branch_back_skips_shared_prefix() {
        let parent = session_with("parent", &["m0", "m1", "m2"]);
        let mut branch = fork(&parent, 2, "branch").unwrap();
        branch.add_message(MessageRole::User, "branch-only");

        let outcome = merge_sessions(&parent, &branch);

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.appended, 1);
        let contents: Vec<&str> = outcome
            .merged
            .conversation
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "branch-only"]);
    }

    #[test]
    fn test_merge_keeps_identity_fields() {
        let current = session_with("current", &["a"]);
        let source = session_with("source", &["x"]);

        let outcome = merge_sessions(&current, &source);
        assert_eq!(outcome.merged.id, current.id);
        assert_eq!(outcome.merged.name, current.name);
        assert_eq!(
            outcome.merged.conversation.messages[1].timestamp,
            source.conversation.messages[0].timestamp
        );
    }

    #[test]
    fn test_merge_with_self_is_noop() {
        let current = session_with("current", &["a", "b"]);
        let outcome = merge_sessions(&current, &current);
        assert_eq!(outcome.appended, 0);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.merged, current);
    }
}
