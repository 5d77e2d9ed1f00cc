//! Branch and merge algebra for conversation history.
//!
//! Sessions form a forest: each non-root session carries `(parent_id,
//! branch_point)`. Everything here works on in-memory values; persisting
//! the results is the caller's job.

mod merge;
mod tree;

pub use merge::{MERGED_FROM_KEY, MergeOutcome, merge_sessions};
pub use tree::{BranchNode, build_tree, children_of, resolve_root_id};

use crate::error::{ParleyError, Result};
use crate::session::{Conversation, Session, generate_session_id};
use chrono::Utc;

/// Forks `source` at `at_index` into a new, unsaved session.
///
/// The new session gets a fresh id, inherits the source's model, provider,
/// generation settings and system prompt, and owns a deep copy of
/// `source.messages[..at_index]`. Message ids are kept so a later merge can
/// recognize the shared prefix.
///
/// # Errors
///
/// `InvalidBranchPoint` unless `0 <= at_index <= source.messages.len()`.
pub fn fork(source: &Session, at_index: usize, name: &str) -> Result<Session> {
    let len = source.conversation.messages.len();
    if at_index > len {
        return Err(ParleyError::InvalidBranchPoint {
            index: at_index,
            len,
        });
    }

    let id = generate_session_id();
    let now = Utc::now();

    let conversation = Conversation {
        id: id.clone(),
        model: source.conversation.model.clone(),
        provider: source.conversation.provider.clone(),
        temperature: source.conversation.temperature,
        max_tokens: source.conversation.max_tokens,
        system_prompt: source.conversation.system_prompt.clone(),
        created: now,
        updated: now,
        messages: source.conversation.messages[..at_index].to_vec(),
    };

    let name = match name.trim() {
        "" => format!("{} (branch)", source.name),
        n => n.to_string(),
    };

    Ok(Session {
        id,
        name,
        conversation,
        config: source.config.clone(),
        created: now,
        updated: now,
        tags: source.tags.clone(),
        metadata: source.visible_metadata(),
        parent_id: Some(source.id.clone()),
        branch_point: Some(at_index),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Attachment, MessageRole};

    fn five_message_session() -> Session {
        let mut session = Session::new(Some("source"), "claude-sonnet-4-20250514");
        session.conversation.set_system_prompt(Some("be helpful".to_string()));
        for i in 0..5 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            session.add_message(role, format!("message {i}"));
        }
        session
    }

    #[test]
    fn test_branch_slices_prefix() {
        let source = five_message_session();
        let child = fork(&source, 2, "child").unwrap();

        assert_eq!(child.conversation.messages.len(), 2);
        assert_eq!(child.conversation.messages[0].content, "message 0");
        assert_eq!(child.conversation.messages[1].content, "message 1");
        assert_ne!(child.id, source.id);
        assert_eq!(child.conversation.id, child.id);
        assert_eq!(child.parent_id.as_deref(), Some(source.id.as_str()));
        assert_eq!(child.branch_point, Some(2));
        assert_eq!(child.name, "child");
    }

    #[test]
    fn test_branch_inherits_generation_settings() {
        let source = five_message_session();
        let child = fork(&source, 5, "").unwrap();

        assert_eq!(child.conversation.model, source.conversation.model);
        assert_eq!(child.conversation.provider, "anthropic");
        assert_eq!(child.conversation.system_prompt.as_deref(), Some("be helpful"));
        assert_eq!(child.conversation.messages.len(), 5);
        assert_eq!(child.name, "source (branch)");
    }

    #[test]
    fn test_branch_bounds() {
        let source = five_message_session();
        assert!(fork(&source, 0, "empty").unwrap().conversation.messages.is_empty());
        assert!(fork(&source, 5, "all").is_ok());

        let err = fork(&source, 6, "too far").unwrap_err();
        assert!(matches!(
            err,
            ParleyError::InvalidBranchPoint { index: 6, len: 5 }
        ));
    }

    #[test]
    fn test_branch_copy_is_independent() {
        let mut source = Session::new(Some("src"), "gpt-4o");
        source.stage_attachment(Attachment::new("a.txt", "text/plain", b"abc".to_vec()));
        source.add_message(MessageRole::User, "with file");

        let mut child = fork(&source, 1, "child").unwrap();
        child.conversation.messages[0].content.push_str(" edited");
        child.conversation.messages[0].attachments[0].content.push(b'!');

        assert_eq!(source.conversation.messages[0].content, "with file");
        assert_eq!(source.conversation.messages[0].attachments[0].content, b"abc");
    }

    #[test]
    fn test_branch_does_not_inherit_pending_attachments() {
        let mut source = Session::new(Some("src"), "gpt-4o");
        source.stage_attachment(Attachment::new("a.txt", "text/plain", b"abc".to_vec()));

        let child = fork(&source, 0, "child").unwrap();
        assert!(child.pending_attachments().is_empty());
    }
}
