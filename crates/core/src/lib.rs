//! kumasync core types: entity kinds, raw records and errors shared by the hub and apply crates.

#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub mod kinds;

pub use kinds::{normalize_type_name, Discriminator, MonitorType, NotificationType};

/// Identifier assigned by a single instance. Meaningless on the other instance.
pub type EntityId = i64;

/// Flat field mapping as accepted by create/update and returned by list.
pub type Fields = serde_json::Map<String, Json>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Monitor,
    Notification,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Monitor => "monitor",
            EntityKind::Notification => "notification",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw entity record as listed by an instance.
///
/// The record is kept as an untyped JSON object: fields the current build does not know
/// about are carried along untouched, and only the projector decides what is forwarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Fields);

impl Record {
    pub fn new(fields: Fields) -> Self {
        Self(fields)
    }

    /// Instance-local id, accepting both numbers and numeric strings.
    pub fn id(&self) -> Option<EntityId> {
        self.0.get("id").and_then(id_from_json)
    }

    /// Join key across instances. Empty names count as absent.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    /// Field lookup treating explicit `null` as absent.
    pub fn get(&self, key: &str) -> Option<&Json> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn fields(&self) -> &Fields {
        &self.0
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Self(fields)
    }
}

/// Parse an id from a JSON number or a numeric string (object keys arrive as strings).
pub fn id_from_json(v: &Json) -> Option<EntityId> {
    match v {
        Json::Number(n) => n.as_i64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Errors surfaced by a remote directory client. No retry happens at this layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("auth: {0}")]
    Auth(String),
    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout { after: Duration, waiting_for: String },
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("not_found: {kind} {id}")]
    NotFound { kind: EntityKind, id: EntityId },
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("connection closed")]
    Closed,
}

/// Recoverable failure scoped to one entity; the batch continues.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EntityError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unknown {kind} type `{type_name}`")]
    UnknownType { kind: EntityKind, type_name: String },
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("remote call failed: {0}")]
    Remote(#[from] ClientError),
}

pub mod prelude {
    pub use super::{
        ClientError, Discriminator, EntityError, EntityId, EntityKind, Fields, MonitorType,
        NotificationType, Record,
    };
}
