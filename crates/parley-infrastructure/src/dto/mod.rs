//! Data Transfer Objects (DTOs) for persistence.
//!
//! DTOs carry the on-disk schema version and migrate older records into the
//! current domain model on read.

pub mod session;

pub use session::{
    SessionCodec, SessionRecord, SessionV1_0_0, SessionV2_0_0, create_session_migrator,
    current_schema_version,
};
