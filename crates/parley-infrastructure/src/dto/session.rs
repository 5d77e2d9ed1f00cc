//! Session DTOs and migrations
//!
//! Both backends persist the same flat document: the session fields plus a
//! top-level `version` stamped by the migrator.

use chrono::{DateTime, Utc};
use parley_core::session::{Conversation, Session};
use parley_core::{ParleyError, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use version_migrate::{FromDomain, IntoDomain, MigratesTo, Migrator, Versioned};

/// Entity name the session migration path is registered under.
pub const SESSION_ENTITY: &str = "session";

/// Key holding the schema version in a stored record.
pub const VERSION_KEY: &str = "version";

/// Key older builds stamped instead of `version`.
const LEGACY_VERSION_KEY: &str = "schema_version";

const LEGACY_PARENT_KEY: &str = "parent_id";
const LEGACY_BRANCH_POINT_KEY: &str = "branch_point";

/// Schema version written by this build.
pub fn current_schema_version() -> Version {
    Version::new(2, 0, 0)
}

// ============================================================================
// Session DTOs
// ============================================================================

/// Represents V1.0.0 of the session data schema.
/// Lineage lived in `metadata.parent_id` / `metadata.branch_point`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct SessionV1_0_0 {
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
}

/// Represents V2.0.0 of the session data schema.
/// Lineage is top-level `parent_id` / `branch_point`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "2.0.0")]
pub struct SessionV2_0_0 {
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_point: Option<usize>,
}

// ============================================================================
// Migration implementations
// ============================================================================

/// Migration from SessionV1_0_0 to SessionV2_0_0.
/// Moves lineage out of `metadata`; the branch point may be a number or a
/// numeric string.
impl MigratesTo<SessionV2_0_0> for SessionV1_0_0 {
    fn migrate(self) -> SessionV2_0_0 {
        let mut metadata = self.metadata;
        let parent = metadata.remove(LEGACY_PARENT_KEY);
        let branch_point = metadata.remove(LEGACY_BRANCH_POINT_KEY);

        let parent_id = match parent {
            Some(Value::String(parent)) if !parent.is_empty() => Some(parent),
            _ => None,
        };
        let branch_point = parent_id.as_ref().and(match branch_point {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        });

        SessionV2_0_0 {
            id: self.id,
            name: self.name,
            conversation: self.conversation,
            config: self.config,
            created: self.created,
            updated: self.updated,
            tags: self.tags,
            metadata,
            parent_id,
            branch_point: branch_point.and_then(|p| usize::try_from(p).ok()),
        }
    }
}

// ============================================================================
// Domain model conversions
// ============================================================================

impl IntoDomain<Session> for SessionV2_0_0 {
    fn into_domain(self) -> Session {
        Session {
            id: self.id,
            name: self.name,
            conversation: self.conversation,
            config: self.config,
            created: self.created,
            updated: self.updated,
            tags: self.tags,
            metadata: self.metadata,
            parent_id: self.parent_id,
            branch_point: self.branch_point,
        }
    }
}

impl FromDomain<Session> for SessionV2_0_0 {
    fn from_domain(session: Session) -> Self {
        let Session {
            id,
            name,
            conversation,
            config,
            created,
            updated,
            tags,
            metadata,
            parent_id,
            branch_point,
        } = session;

        SessionV2_0_0 {
            id,
            name,
            conversation,
            config,
            created,
            updated,
            tags,
            metadata,
            parent_id,
            branch_point,
        }
    }
}

// ============================================================================
// Migrator factory
// ============================================================================

/// Creates and configures a Migrator instance for Session entities.
///
/// # Migration Path
///
/// - V1.0.0 → V2.0.0: Moves `parent_id` / `branch_point` out of `metadata`
/// - V2.0.0 → Session: Converts DTO to domain model
pub fn create_session_migrator() -> Result<Migrator> {
    let mut migrator = Migrator::builder().build();

    let session_path = Migrator::define(SESSION_ENTITY)
        .from::<SessionV1_0_0>()
        .step::<SessionV2_0_0>()
        .into_with_save::<Session>();

    migrator.register(session_path).map_err(|e| {
        ParleyError::internal(format!("Failed to register session migration path: {}", e))
    })?;

    Ok(migrator)
}

/// A stored session plus the schema version it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub schema_version: Version,
    pub session: Session,
}

impl SessionRecord {
    /// True when the record was migrated from an older schema on read.
    pub fn was_migrated(&self) -> bool {
        self.schema_version.major < current_schema_version().major
    }
}

/// Encodes sessions at the current schema and decodes any known schema.
pub struct SessionCodec {
    migrator: Migrator,
}

impl SessionCodec {
    pub fn new() -> Result<Self> {
        Ok(Self {
            migrator: create_session_migrator()?,
        })
    }

    /// Serializes at the current schema version.
    pub fn encode(&self, session: &Session) -> Result<Vec<u8>> {
        let flat = self
            .migrator
            .save_domain_flat(SESSION_ENTITY, session)
            .map_err(|e| ParleyError::Serialization {
                format: "migration".to_string(),
                message: e.to_string(),
            })?;
        let value: Value = serde_json::from_str(&flat)?;
        Ok(serde_json::to_vec_pretty(&value)?)
    }

    /// Parses stored bytes, migrating older schemas.
    ///
    /// `record_id` names the record in `CorruptRecord` errors.
    pub fn decode(&self, record_id: &str, bytes: &[u8]) -> Result<SessionRecord> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ParleyError::corrupt(record_id, format!("invalid JSON: {}", e)))?;
        self.from_value(record_id, value)
    }

    pub fn from_value(&self, record_id: &str, value: Value) -> Result<SessionRecord> {
        let Value::Object(mut map) = value else {
            return Err(ParleyError::corrupt(record_id, "record is not a JSON object"));
        };

        // Unstamped records predate versioning
        let stamp = match map.remove(VERSION_KEY).or_else(|| map.remove(LEGACY_VERSION_KEY)) {
            None => Value::String("1.0.0".to_string()),
            Some(stamp) => stamp,
        };
        let schema_version = match &stamp {
            Value::String(s) => Version::parse(s).map_err(|e| {
                ParleyError::corrupt(record_id, format!("invalid version '{}': {}", s, e))
            })?,
            other => {
                return Err(ParleyError::corrupt(
                    record_id,
                    format!("invalid version: {}", other),
                ));
            }
        };
        map.insert(VERSION_KEY.to_string(), stamp);

        let session: Session = self
            .migrator
            .load_flat_from(SESSION_ENTITY, Value::Object(map))
            .map_err(|e| ParleyError::corrupt(record_id, e.to_string()))?;

        Ok(SessionRecord {
            schema_version,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::MessageRole;
    use serde_json::json;

    fn codec() -> SessionCodec {
        SessionCodec::new().unwrap()
    }

    #[test]
    fn test_encode_stamps_current_version() {
        let codec = codec();
        let session = Session::new(Some("v2"), "gpt-4o");
        let bytes = codec.encode(&session).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[VERSION_KEY], json!("2.0.0"));

        let record = codec.decode(&session.id, &bytes).unwrap();
        assert_eq!(record.session, session);
        assert!(!record.was_migrated());
    }

    #[test]
    fn test_v1_lineage_is_migrated() {
        let mut parent = Session::new(Some("parent"), "gpt-4o");
        parent.add_message(MessageRole::User, "hi");
        let mut value = serde_json::to_value(&parent).unwrap();
        let map = value.as_object_mut().unwrap();
        map.insert(
            "metadata".into(),
            json!({
                "parent_id": "20250101-000000-deadbeef",
                "branch_point": "3",
                "color": "blue"
            }),
        );

        let bytes = serde_json::to_vec(&value).unwrap();
        let record = codec().decode(&parent.id, &bytes).unwrap();

        assert!(record.was_migrated());
        assert_eq!(record.schema_version, Version::new(1, 0, 0));
        assert_eq!(
            record.session.parent_id.as_deref(),
            Some("20250101-000000-deadbeef")
        );
        assert_eq!(record.session.branch_point, Some(3));
        assert!(!record.session.metadata.contains_key("parent_id"));
        assert_eq!(record.session.metadata["color"], json!("blue"));
        assert_eq!(record.session.conversation.messages.len(), 1);
    }

    #[test]
    fn test_v1_migration_step() {
        let session = Session::new(Some("root"), "gpt-4o");
        let v1 = SessionV1_0_0 {
            id: session.id.clone(),
            name: session.name.clone(),
            conversation: session.conversation.clone(),
            config: BTreeMap::new(),
            created: session.created,
            updated: session.updated,
            tags: vec!["a".into()],
            metadata: BTreeMap::from([("branch_point".to_string(), json!(4))]),
        };

        let v2 = v1.migrate();
        // A branch point without a parent is dropped
        assert_eq!(v2.parent_id, None);
        assert_eq!(v2.branch_point, None);
        assert!(v2.metadata.is_empty());
        assert_eq!(v2.into_domain().tags, vec!["a".to_string()]);
    }

    #[test]
    fn test_legacy_version_key_is_accepted() {
        let session = Session::new(None, "gpt-4o");
        let mut value = serde_json::to_value(&session).unwrap();
        value[LEGACY_VERSION_KEY] = json!("2.0.0");

        let record = codec().from_value(&session.id, value).unwrap();
        assert_eq!(record.session, session);
        assert!(!record.was_migrated());
    }

    #[test]
    fn test_unsupported_version_is_corrupt() {
        let session = Session::new(None, "gpt-4o");
        let mut value = serde_json::to_value(&session).unwrap();
        value[VERSION_KEY] = json!("3.0.0");

        let err = codec().from_value(&session.id, value).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let codec = codec();
        assert!(codec.decode("x", b"not json").unwrap_err().is_corrupt());
        assert!(codec.decode("x", b"[1, 2]").unwrap_err().is_corrupt());
        assert!(codec.decode("x", br#"{"id": "x"}"#).unwrap_err().is_corrupt());
    }
}
