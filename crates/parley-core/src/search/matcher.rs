//! Case-insensitive substring matching and snippet extraction.

use super::model::{MatchType, SearchMatch, SessionSearchResult};
use crate::session::Session;

/// Characters of context kept on each side of a match.
pub const SNIPPET_CONTEXT_CHARS: usize = 40;

/// Marker added where a snippet was cut.
pub const ELLIPSIS: &str = "...";

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Returns the character offset of the first case-insensitive occurrence.
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let hay: Vec<char> = haystack.chars().collect();
    let pat: Vec<char> = needle.chars().collect();
    if pat.is_empty() || pat.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - pat.len()).find(|&start| {
        hay[start..start + pat.len()]
            .iter()
            .zip(&pat)
            .all(|(&h, &p)| chars_eq_ignore_case(h, p))
    })
}

/// Builds a context snippet around `[position, position + match_len)`.
///
/// Never starts or ends mid-word unless the word itself is the match;
/// an ellipsis marks each side that does not reach the content boundary.
pub fn make_snippet(content: &str, position: usize, match_len: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let len = chars.len();
    let match_end = (position + match_len).min(len);

    let mut start = position.saturating_sub(SNIPPET_CONTEXT_CHARS);
    let mut end = (match_end + SNIPPET_CONTEXT_CHARS).min(len);

    // Move forward off a partial leading word
    if start > 0 && !chars[start - 1].is_whitespace() {
        while start < position && !chars[start].is_whitespace() {
            start += 1;
        }
    }
    // Move back off a partial trailing word
    if end < len && !chars[end].is_whitespace() {
        while end > match_end && !chars[end - 1].is_whitespace() {
            end -= 1;
        }
    }

    let body: String = chars[start..end].iter().collect();
    let body = body.trim();

    let mut snippet = String::with_capacity(body.len() + 2 * ELLIPSIS.len());
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.push_str(body);
    if end < len {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

fn match_field(
    content: &str,
    query: &str,
    match_type: MatchType,
) -> Option<SearchMatch> {
    let position = find_ignore_case(content, query)?;
    Some(SearchMatch {
        match_type,
        role: None,
        message_index: None,
        content: content.to_string(),
        snippet: make_snippet(content, position, query.chars().count()),
        position,
    })
}

/// Matches `query` against one session's messages, name, system prompt and tags.
///
/// Returns `None` when nothing matches or the query is blank.
pub fn search_session(session: &Session, query: &str) -> Option<SessionSearchResult> {
    if query.trim().is_empty() {
        return None;
    }

    let mut matches = Vec::new();

    if let Some(m) = match_field(&session.name, query, MatchType::Name) {
        matches.push(m);
    }

    if let Some(prompt) = &session.conversation.system_prompt
        && let Some(m) = match_field(prompt, query, MatchType::SystemPrompt)
    {
        matches.push(m);
    }

    for tag in &session.tags {
        if let Some(m) = match_field(tag, query, MatchType::Tag) {
            matches.push(m);
        }
    }

    for (index, message) in session.conversation.messages.iter().enumerate() {
        if let Some(mut m) = match_field(&message.content, query, MatchType::Message) {
            m.role = Some(message.role);
            m.message_index = Some(index);
            matches.push(m);
        }
    }

    if matches.is_empty() {
        None
    } else {
        Some(SessionSearchResult {
            session: session.info(),
            matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MessageRole;

    fn quantum_session() -> Session {
        let mut session = Session::new(Some("Physics chat"), "gpt-4o");
        session.add_message(MessageRole::User, "Quantum computing uses qubits");
        session.add_message(MessageRole::Assistant, "Indeed, superposition matters.");
        session
    }

    #[test]
    fn test_substring_search_is_case_insensitive() {
        let session = quantum_session();

        for query in ["quantum", "QUANTUM", "comput"] {
            let result = search_session(&session, query)
                .unwrap_or_else(|| panic!("expected a match for {query}"));
            assert_eq!(result.session.id, session.id);
            assert_eq!(result.matches[0].match_type, MatchType::Message);
            assert_eq!(result.matches[0].role, Some(MessageRole::User));
        }

        assert!(search_session(&session, "nonexistent").is_none());
    }

    #[test]
    fn test_matches_name_prompt_and_tags() {
        let mut session = quantum_session();
        session.conversation.set_system_prompt(Some("You explain physics.".to_string()));
        session.add_tag("physics-notes");

        let result = search_session(&session, "physics").unwrap();
        let types: Vec<MatchType> = result.matches.iter().map(|m| m.match_type).collect();

        assert!(types.contains(&MatchType::Name));
        assert!(types.contains(&MatchType::SystemPrompt));
        assert!(types.contains(&MatchType::Tag));
        assert!(!types.contains(&MatchType::Message));
    }

    #[test]
    fn test_position_is_character_offset() {
        assert_eq!(find_ignore_case("héllo wörld", "WÖR"), Some(6));
        assert_eq!(find_ignore_case("abc", ""), None);
        assert_eq!(find_ignore_case("ab", "abc"), None);
    }

    #[test]
    fn test_blank_query_matches_nothing() {
        assert!(search_session(&quantum_session(), "   ").is_none());
    }

    #[test]
    fn test_short_content_snippet_has_no_ellipsis() {
        let snippet = make_snippet("Quantum computing uses qubits", 8, 6);
        assert_eq!(snippet, "Quantum computing uses qubits");
    }

    #[test]
    fn test_long_content_snippet_trims_at_word_boundaries() {
        let content = format!(
            "{} needle {}",
            "alpha bravo charlie delta echo foxtrot golf hotel",
            "india juliet kilo lima mike november oscar papa"
        );
        let position = find_ignore_case(&content, "needle").unwrap();
        let snippet = make_snippet(&content, position, 6);

        assert!(snippet.starts_with(ELLIPSIS));
        assert!(snippet.ends_with(ELLIPSIS));
        assert!(snippet.contains("needle"));

        let inner = snippet
            .trim_start_matches(ELLIPSIS)
            .trim_end_matches(ELLIPSIS);
        let words: Vec<&str> = content.split_whitespace().collect();
        for word in inner.split_whitespace() {
            assert!(words.contains(&word), "snippet split a word: {word}");
        }
    }
}
