//! Change notifications published by the owning services

use crate::search::{DocumentKey, EntityType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// What happened to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeOperation {
    Upsert,
    Delete,
}

/// One at-least-once change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Delivery id; generated when the producer omits it
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Owning tenant; absent or empty for global records
    #[serde(default)]
    pub tenant_id: Option<String>,

    pub id: String,

    pub operation: ChangeOperation,

    /// Source record; ignored for deletes
    #[serde(default)]
    pub payload: Map<String, Value>,

    /// Version of the record after the change
    pub updated_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn upsert(
        entity_type: EntityType,
        tenant_id: Option<&str>,
        id: impl Into<String>,
        payload: Value,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            event_id: Uuid::new_v4(),
            entity_type,
            tenant_id: tenant_id.map(str::to_string),
            id: id.into(),
            operation: ChangeOperation::Upsert,
            payload,
            updated_at,
        }
    }

    pub fn delete(
        entity_type: EntityType,
        tenant_id: Option<&str>,
        id: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            entity_type,
            tenant_id: tenant_id.map(str::to_string),
            id: id.into(),
            operation: ChangeOperation::Delete,
            payload: Map::new(),
            updated_at,
        }
    }

    /// Key of the record this event targets; the id is trimmed
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.tenant_id.as_deref(), self.entity_type, self.id.trim())
    }
}
