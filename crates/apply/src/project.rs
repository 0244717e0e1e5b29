//! Projection of raw primary records into the field sets the secondary accepts.
//!
//! Only allowlisted fields are forwarded: anything a newer or older instance adds is dropped
//! here instead of failing the write with an unexpected argument.

use kumasync_core::{
    id_from_json, Discriminator, EntityError, EntityId, EntityKind, Fields, MonitorType, NotificationType, Record,
};
use serde_json::Value as Json;

use crate::remap::ReferenceRemapper;

/// Monitor fields forwarded to the secondary.
pub const MONITOR_FIELDS: &[&str] = &[
    "name",
    "type",
    "url",
    "hostname",
    "port",
    "interval",
    "retryInterval",
    "maxretries",
    "timeout",
    "keyword",
    "ignoreTls",
    "upsideDown",
    "notificationIDList",
    "method",
    "headers",
    "body",
    "accepted_statuscodes",
    "dns_resolve_type",
    "dns_resolve_server",
];

/// Validated write payload for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub name: String,
    pub discriminator: Discriminator,
    pub fields: Fields,
}

/// Per-kind projection used by the reconciler.
pub trait Project: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Never mutates `raw`.
    fn project(&self, raw: &Record) -> Result<Projection, EntityError>;
}

fn required_name(raw: &Record) -> Result<String, EntityError> {
    raw.name().map(str::to_string).ok_or(EntityError::MissingField("name"))
}

fn type_name(raw: &Record) -> Result<&str, EntityError> {
    raw.get("type").and_then(|v| v.as_str()).ok_or(EntityError::MissingField("type"))
}

fn unknown(kind: EntityKind, type_name: &str) -> EntityError {
    EntityError::UnknownType { kind, type_name: type_name.to_string() }
}

fn flag(v: &Json) -> Option<bool> {
    match v {
        Json::Bool(b) => Some(*b),
        Json::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn non_empty_str<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(|v| v.as_str()).map(str::trim).filter(|s| !s.is_empty())
}

fn require_str(fields: &Fields, key: &'static str, mtype: MonitorType) -> Result<(), EntityError> {
    match non_empty_str(fields, key) {
        Some(_) => Ok(()),
        None => Err(EntityError::InvalidField { field: key, reason: format!("required for {mtype} monitors") }),
    }
}

/// Accepts `[1, 2]` or `{ "1": true, "2": true }`.
fn id_list(v: &Json) -> Result<Vec<EntityId>, EntityError> {
    let invalid = |reason: String| EntityError::InvalidField { field: "notificationIDList", reason };
    match v {
        Json::Array(items) => items
            .iter()
            .map(|item| id_from_json(item).ok_or_else(|| invalid(format!("not an id: {item}"))))
            .collect(),
        Json::Object(map) => {
            let mut ids: Vec<EntityId> = Vec::with_capacity(map.len());
            for (k, on) in map {
                if flag(on) == Some(true) {
                    ids.push(k.parse().map_err(|_| invalid(format!("not an id: {k}")))?);
                }
            }
            ids.sort_unstable();
            Ok(ids)
        }
        other => Err(invalid(format!("expected a list, got {other}"))),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationProjector;

impl Project for NotificationProjector {
    fn kind(&self) -> EntityKind {
        EntityKind::Notification
    }

    fn project(&self, raw: &Record) -> Result<Projection, EntityError> {
        let name = required_name(raw)?;
        let raw_type = type_name(raw)?;
        let ntype = NotificationType::resolve(raw_type).ok_or_else(|| unknown(EntityKind::Notification, raw_type))?;
        let config = match raw.get("config") {
            None => Fields::new(),
            Some(Json::Object(map)) => map.clone(),
            Some(other) => {
                return Err(EntityError::InvalidField { field: "config", reason: format!("expected an object, got {other}") })
            }
        };
        let active = raw.get("active").and_then(flag).unwrap_or(true);
        let is_default = raw.get("isDefault").and_then(flag).unwrap_or(false);

        let mut fields = Fields::new();
        fields.insert("name".into(), Json::String(name.clone()));
        fields.insert("type".into(), Json::String(ntype.as_wire().to_string()));
        fields.insert("config".into(), Json::Object(config));
        fields.insert("active".into(), Json::Bool(active));
        fields.insert("isDefault".into(), Json::Bool(is_default));
        Ok(Projection { name, discriminator: Discriminator::Notification(ntype), fields })
    }
}

/// Monitor projection; notification references are translated on the way through.
#[derive(Debug, Clone, Default)]
pub struct MonitorProjector {
    remapper: ReferenceRemapper,
}

impl MonitorProjector {
    pub fn new(remapper: ReferenceRemapper) -> Self {
        Self { remapper }
    }
}

fn apply_monitor_defaults(mtype: MonitorType, fields: &mut Fields) {
    match mtype {
        MonitorType::Port => {
            fields.entry("port").or_insert(Json::from(80));
        }
        MonitorType::Dns => {
            fields.entry("port").or_insert(Json::from(53));
            fields.entry("dns_resolve_type").or_insert(Json::from("A"));
            fields.entry("dns_resolve_server").or_insert(Json::from("1.1.1.1"));
        }
        MonitorType::Http | MonitorType::Keyword | MonitorType::JsonQuery => {
            fields.entry("accepted_statuscodes").or_insert(serde_json::json!(["200-299"]));
        }
        _ => {}
    }
}

fn validate_monitor(mtype: MonitorType, fields: &Fields) -> Result<(), EntityError> {
    match mtype {
        MonitorType::Http | MonitorType::JsonQuery | MonitorType::RealBrowser => require_str(fields, "url", mtype),
        MonitorType::Keyword => {
            require_str(fields, "url", mtype)?;
            require_str(fields, "keyword", mtype)
        }
        MonitorType::Port | MonitorType::Ping | MonitorType::Dns => require_str(fields, "hostname", mtype),
        _ => Ok(()),
    }
}

impl Project for MonitorProjector {
    fn kind(&self) -> EntityKind {
        EntityKind::Monitor
    }

    fn project(&self, raw: &Record) -> Result<Projection, EntityError> {
        let name = required_name(raw)?;
        let raw_type = type_name(raw)?;
        let mtype = MonitorType::resolve(raw_type).ok_or_else(|| unknown(EntityKind::Monitor, raw_type))?;

        let mut fields: Fields = MONITOR_FIELDS
            .iter()
            .filter_map(|key| raw.get(key).map(|v| (key.to_string(), v.clone())))
            .collect();
        fields.insert("name".into(), Json::String(name.clone()));
        fields.insert("type".into(), Json::String(mtype.as_wire().to_string()));
        apply_monitor_defaults(mtype, &mut fields);
        validate_monitor(mtype, &fields)?;

        if let Some(list) = fields.get("notificationIDList") {
            let remapped = self.remapper.remap(&id_list(list)?);
            fields.insert("notificationIDList".into(), Json::from(remapped));
        }
        Ok(Projection { name, discriminator: Discriminator::Monitor(mtype), fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Json) -> Record {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn monitor_allowlist_drops_unknown_and_null_fields() {
        let raw = rec(json!({
            "id": 3,
            "name": "web1",
            "type": "http",
            "url": "https://x",
            "interval": 60,
            "keyword": null,
            "kafkaProducerSaslOptions": { "mechanism": "None" },
            "someFutureField": true
        }));
        let before = raw.clone();
        let p = MonitorProjector::default().project(&raw).unwrap();
        assert_eq!(raw, before);
        assert_eq!(p.name, "web1");
        assert_eq!(p.discriminator, Discriminator::Monitor(MonitorType::Http));
        assert_eq!(
            Json::Object(p.fields),
            json!({
                "name": "web1",
                "type": "http",
                "url": "https://x",
                "interval": 60,
                "accepted_statuscodes": ["200-299"]
            })
        );
    }

    #[test]
    fn monitor_type_is_translated_to_target_enumeration() {
        let raw = rec(json!({ "name": "q", "type": "JSON-QUERY", "url": "https://api" }));
        let p = MonitorProjector::default().project(&raw).unwrap();
        assert_eq!(p.fields["type"], json!("json-query"));
    }

    #[test]
    fn port_and_dns_defaults() {
        let port = MonitorProjector::default()
            .project(&rec(json!({ "name": "db", "type": "port", "hostname": "db.local" })))
            .unwrap();
        assert_eq!(port.fields["port"], json!(80));

        let dns = MonitorProjector::default()
            .project(&rec(json!({ "name": "ns", "type": "dns", "hostname": "example.com", "dns_resolve_type": "MX" })))
            .unwrap();
        assert_eq!(dns.fields["dns_resolve_type"], json!("MX"));
        assert_eq!(dns.fields["dns_resolve_server"], json!("1.1.1.1"));
        assert_eq!(dns.fields["port"], json!(53));

        let dns = MonitorProjector::default()
            .project(&rec(json!({ "name": "ns", "type": "dns", "hostname": "example.com" })))
            .unwrap();
        assert_eq!(dns.fields["dns_resolve_type"], json!("A"));
    }

    #[test]
    fn explicit_port_is_kept() {
        let p = MonitorProjector::default()
            .project(&rec(json!({ "name": "ssh", "type": "port", "hostname": "h", "port": 22 })))
            .unwrap();
        assert_eq!(p.fields["port"], json!(22));
    }

    #[test]
    fn unresolvable_type_and_missing_fields_are_entity_errors() {
        let err = MonitorProjector::default()
            .project(&rec(json!({ "name": "x", "type": "carrier-pigeon" })))
            .unwrap_err();
        assert!(matches!(err, EntityError::UnknownType { kind: EntityKind::Monitor, ref type_name } if type_name == "carrier-pigeon"));

        let err = MonitorProjector::default().project(&rec(json!({ "type": "http" }))).unwrap_err();
        assert!(matches!(err, EntityError::MissingField("name")));

        let err = MonitorProjector::default().project(&rec(json!({ "name": "x", "type": 5 }))).unwrap_err();
        assert!(matches!(err, EntityError::MissingField("type")));

        let err = MonitorProjector::default()
            .project(&rec(json!({ "name": "x", "type": "keyword", "url": "https://x" })))
            .unwrap_err();
        assert!(matches!(err, EntityError::InvalidField { field: "keyword", .. }));

        let err = MonitorProjector::default().project(&rec(json!({ "name": "x", "type": "ping" }))).unwrap_err();
        assert!(matches!(err, EntityError::InvalidField { field: "hostname", .. }));
    }

    #[test]
    fn notification_ids_are_remapped_from_list_or_object() {
        let primary = vec![rec(json!({ "id": 7, "name": "slack-ops" })), rec(json!({ "id": 8, "name": "gone" }))];
        let secondary = vec![rec(json!({ "id": 2, "name": "slack-ops" }))];
        let projector = MonitorProjector::new(ReferenceRemapper::from_listings(&primary, &secondary));

        let p = projector
            .project(&rec(json!({ "name": "web1", "type": "http", "url": "https://x", "notificationIDList": [7, 8] })))
            .unwrap();
        assert_eq!(p.fields["notificationIDList"], json!([2]));

        let p = projector
            .project(&rec(json!({ "name": "web1", "type": "http", "url": "https://x", "notificationIDList": { "7": true, "8": false } })))
            .unwrap();
        assert_eq!(p.fields["notificationIDList"], json!([2]));

        let err = projector
            .project(&rec(json!({ "name": "web1", "type": "http", "url": "https://x", "notificationIDList": "7" })))
            .unwrap_err();
        assert!(matches!(err, EntityError::InvalidField { field: "notificationIDList", .. }));
    }

    #[test]
    fn notification_projection_forwards_config_verbatim() {
        let raw = rec(json!({
            "id": 7,
            "name": "slack-ops",
            "type": "slack",
            "config": { "slackwebhookURL": "https://hooks", "nested": { "k": [1, 2] } },
            "userId": 1
        }));
        let p = NotificationProjector.project(&raw).unwrap();
        assert_eq!(p.discriminator, Discriminator::Notification(NotificationType::Slack));
        assert_eq!(
            Json::Object(p.fields),
            json!({
                "name": "slack-ops",
                "type": "slack",
                "config": { "slackwebhookURL": "https://hooks", "nested": { "k": [1, 2] } },
                "active": true,
                "isDefault": false
            })
        );
    }

    #[test]
    fn notification_flags_and_bad_config() {
        let p = NotificationProjector
            .project(&rec(json!({ "name": "rc", "type": "rocket.chat", "active": 0, "isDefault": true })))
            .unwrap();
        assert_eq!(p.fields["type"], json!("rocket.chat"));
        assert_eq!(p.fields["active"], json!(false));
        assert_eq!(p.fields["isDefault"], json!(true));
        assert_eq!(p.fields["config"], json!({}));

        let err = NotificationProjector
            .project(&rec(json!({ "name": "rc", "type": "slack", "config": "{}" })))
            .unwrap_err();
        assert!(matches!(err, EntityError::InvalidField { field: "config", .. }));

        let err = NotificationProjector
            .project(&rec(json!({ "name": "x", "type": "pigeon-post" })))
            .unwrap_err();
        assert!(matches!(err, EntityError::UnknownType { kind: EntityKind::Notification, .. }));
    }
}
