//! Content search over stored sessions.
//!
//! There is no persistent index: every query scans the sessions a store
//! returns and matches message content, session name, system prompt and
//! tags with case-insensitive substring comparison.

pub mod matcher;
pub mod model;

pub use matcher::{find_ignore_case, make_snippet, search_session};
pub use model::{MatchType, SearchMatch, SessionSearchResult};
