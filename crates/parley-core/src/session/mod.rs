//! Session domain module.
//!
//! This module contains all session-related domain models, the store
//! interface backends implement, and export rendering.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`, `SessionInfo`)
//! - `conversation`: The transcript and its generation settings (`Conversation`)
//! - `message`: Conversation message types (`Message`, `MessageRole`, `Attachment`)
//! - `repository`: Store trait for session persistence (`SessionStore`)
//! - `export`: JSON and Markdown renderers (`ExportFormat`)
//!
//! # Usage
//!
//! ```ignore
//! use parley_core::session::{Session, SessionStore, SessionInfo};
//! use parley_core::session::{Message, MessageRole, Attachment};
//! ```

mod conversation;
mod export;
mod message;
mod model;
mod repository;

// Re-export public API
pub use conversation::{Conversation, MAX_TEMPERATURE, provider_for_model};
pub use export::{ExportFormat, render_json, render_markdown};
pub use message::{Attachment, AttachmentType, Message, MessageRole};
pub use model::{
    DEFAULT_SESSION_NAME, PENDING_ATTACHMENTS_KEY, Session, SessionInfo, generate_session_id,
    validate_id,
};
pub use repository::SessionStore;
