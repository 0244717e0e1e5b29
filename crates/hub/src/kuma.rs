//! Uptime Kuma client over Socket.IO (websocket transport).
//!
//! The server pushes `monitorList` and `notificationList` after login. Before acknowledging a
//! write it refreshes them: 1.x re-sends the full lists, 2.x sends `updateMonitorIntoList` and
//! `deleteMonitorFromList` deltas for monitors. Both shapes are folded into the cache, so it is
//! current whenever an ack has been read.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use kumasync_core::{id_from_json, ClientError, EntityId, EntityKind, Fields, Record};
use serde_json::{json, Value as Json};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::packet::Packet;
use crate::{Connector, DirectoryClient, Endpoint};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MONITOR_LIST: &str = "monitorList";
const NOTIFICATION_LIST: &str = "notificationList";
const MONITOR_UPSERT: &str = "updateMonitorIntoList";
const MONITOR_REMOVE: &str = "deleteMonitorFromList";

/// Notification keys stored next to the provider config rather than inside it.
const NOTIFICATION_ENVELOPE: &[&str] = &["id", "name", "type", "active", "isDefault", "applyExisting", "userId"];

#[derive(Debug, Clone, Copy, Default)]
pub struct KumaConnector;

impl KumaConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for KumaConnector {
    type Client = KumaClient;

    async fn connect(&self, endpoint: &Endpoint) -> Result<KumaClient, ClientError> {
        KumaClient::connect(endpoint).await
    }
}

/// Build the Socket.IO websocket URL from a base http(s)/ws(s) URL.
pub fn socket_url(base: &str) -> Result<String, ClientError> {
    let base = base.trim().trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(ClientError::Connect(format!("unsupported url scheme: {base}")));
    };
    Ok(format!("{ws}/socket.io/?EIO=4&transport=websocket"))
}

pub struct KumaClient {
    label: String,
    ws: WsStream,
    timeout: Duration,
    next_ack: u64,
    monitors: Option<Vec<Record>>,
    notifications: Option<Vec<Record>>,
    closed: bool,
}

impl KumaClient {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, ClientError> {
        let url = socket_url(&endpoint.url)?;
        debug!(endpoint = %endpoint.label, url = %url, "kuma: connecting");
        let (ws, _) = tokio::time::timeout(endpoint.timeout, tokio_tungstenite::connect_async(url.as_str()))
            .await
            .map_err(|_| ClientError::Timeout { after: endpoint.timeout, waiting_for: "websocket connect".into() })?
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let mut client = KumaClient {
            label: endpoint.label.clone(),
            ws,
            timeout: endpoint.timeout,
            next_ack: 0,
            monitors: None,
            notifications: None,
            closed: false,
        };
        client.handshake().await?;
        client.login(&endpoint.credentials.username, &endpoint.credentials.password).await?;
        info!(endpoint = %client.label, "kuma: logged in");
        Ok(client)
    }

    async fn handshake(&mut self) -> Result<(), ClientError> {
        let deadline = self.deadline();
        loop {
            match self.recv(deadline, "engine.io open").await? {
                Packet::Open(_) => break,
                other => debug!(packet = ?other, "kuma: ignoring pre-open packet"),
            }
        }
        self.send(&Packet::Connect(Json::Null)).await?;
        loop {
            match self.recv(deadline, "namespace connect").await? {
                Packet::Connect(_) => return Ok(()),
                Packet::ConnectError(e) => return Err(ClientError::Connect(format!("namespace refused: {e}"))),
                other => debug!(packet = ?other, "kuma: ignoring pre-connect packet"),
            }
        }
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let resp = self
            .emit("login", vec![json!({ "username": username, "password": password, "token": "" })])
            .await?;
        if resp.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(());
        }
        if resp.get("tokenRequired").and_then(|v| v.as_bool()) == Some(true) {
            return Err(ClientError::Auth("two-factor token required".into()));
        }
        Err(ClientError::Auth(ack_message(&resp)))
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        self.ws
            .send(WsMessage::Text(packet.encode().into()))
            .await
            .map_err(|e| ClientError::Protocol(format!("websocket send: {e}")))
    }

    /// Next packet worth acting on. Answers pings and refreshes the list caches on the way.
    async fn recv(&mut self, deadline: Instant, waiting_for: &str) -> Result<Packet, ClientError> {
        loop {
            if self.closed {
                return Err(ClientError::Closed);
            }
            let frame = tokio::time::timeout_at(deadline, self.ws.next())
                .await
                .map_err(|_| ClientError::Timeout { after: self.timeout, waiting_for: waiting_for.to_string() })?;
            let text = match frame {
                Some(Ok(WsMessage::Text(t))) => t,
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.closed = true;
                    return Err(ClientError::Closed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::Protocol(format!("websocket receive: {e}"))),
            };
            let packet = Packet::decode(text.as_str())?;
            match &packet {
                Packet::Ping => {
                    self.send(&Packet::Pong).await?;
                    continue;
                }
                Packet::Close | Packet::Disconnect => {
                    self.closed = true;
                    return Err(ClientError::Closed);
                }
                Packet::Event { name, args, .. } if name == MONITOR_LIST => {
                    let list = monitors_from_wire(args.first().unwrap_or(&Json::Null))?;
                    debug!(endpoint = %self.label, count = list.len(), "kuma: monitor list pushed");
                    self.monitors = Some(list);
                }
                Packet::Event { name, args, .. } if name == MONITOR_UPSERT => {
                    let rows = monitors_from_wire(args.first().unwrap_or(&Json::Null))?;
                    debug!(endpoint = %self.label, count = rows.len(), "kuma: monitors updated");
                    if let Some(cache) = self.monitors.as_mut() {
                        upsert_monitors(cache, rows);
                    }
                }
                Packet::Event { name, args, .. } if name == MONITOR_REMOVE => {
                    if let (Some(cache), Some(id)) = (self.monitors.as_mut(), args.first().and_then(id_from_json)) {
                        debug!(endpoint = %self.label, id, "kuma: monitor removed");
                        cache.retain(|r| r.id() != Some(id));
                    }
                }
                Packet::Event { name, args, .. } if name == NOTIFICATION_LIST => {
                    let list = notifications_from_wire(args.first().unwrap_or(&Json::Null))?;
                    debug!(endpoint = %self.label, count = list.len(), "kuma: notification list pushed");
                    self.notifications = Some(list);
                }
                _ => {}
            }
            return Ok(packet);
        }
    }

    /// Emit an event and wait for its acknowledgement payload.
    async fn emit(&mut self, name: &str, args: Vec<Json>) -> Result<Json, ClientError> {
        self.next_ack += 1;
        let id = self.next_ack;
        self.send(&Packet::Event { ack: Some(id), name: name.to_string(), args }).await?;
        let deadline = self.deadline();
        loop {
            if let Packet::Ack { id: got, args } = self.recv(deadline, name).await? {
                if got == id {
                    return Ok(args.into_iter().next().unwrap_or(Json::Null));
                }
                warn!(endpoint = %self.label, expected = id, got, "kuma: stray ack");
            }
        }
    }

    /// Emit a write and require `ok: true`.
    async fn write(&mut self, name: &str, args: Vec<Json>) -> Result<Json, ClientError> {
        let resp = self.emit(name, args).await?;
        if resp.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            Ok(resp)
        } else {
            Err(ClientError::Rejected(ack_message(&resp)))
        }
    }

    fn cached(&self, kind: EntityKind) -> Option<&Vec<Record>> {
        match kind {
            EntityKind::Monitor => self.monitors.as_ref(),
            EntityKind::Notification => self.notifications.as_ref(),
        }
    }
}

#[async_trait::async_trait]
impl DirectoryClient for KumaClient {
    async fn list(&mut self, kind: EntityKind) -> Result<Vec<Record>, ClientError> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        let deadline = self.deadline();
        let waiting_for = match kind {
            EntityKind::Monitor => MONITOR_LIST,
            EntityKind::Notification => NOTIFICATION_LIST,
        };
        loop {
            if let Some(items) = self.cached(kind) {
                return Ok(items.clone());
            }
            self.recv(deadline, waiting_for).await?;
        }
    }

    async fn create(&mut self, kind: EntityKind, fields: &Fields) -> Result<EntityId, ClientError> {
        let resp = match kind {
            EntityKind::Monitor => self.write("add", vec![Json::Object(monitor_to_wire(fields))]).await?,
            EntityKind::Notification => {
                self.write("addNotification", vec![Json::Object(notification_to_wire(fields)), Json::Null]).await?
            }
        };
        let key = match kind {
            EntityKind::Monitor => "monitorID",
            EntityKind::Notification => "id",
        };
        resp.get(key)
            .and_then(id_from_json)
            .ok_or_else(|| ClientError::Protocol(format!("{kind} create ack missing `{key}`")))
    }

    async fn update(&mut self, kind: EntityKind, id: EntityId, fields: &Fields) -> Result<(), ClientError> {
        match kind {
            EntityKind::Monitor => {
                // editMonitor replaces the whole row, so start from the live monitor.
                let current = self.list(kind).await?;
                let base = current
                    .into_iter()
                    .find(|r| r.id() == Some(id))
                    .ok_or(ClientError::NotFound { kind, id })?;
                let mut merged = base.0;
                merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                merged.insert("id".into(), Json::from(id));
                self.write("editMonitor", vec![Json::Object(monitor_to_wire(&merged))]).await?;
            }
            EntityKind::Notification => {
                self.write("addNotification", vec![Json::Object(notification_to_wire(fields)), Json::from(id)])
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete(&mut self, kind: EntityKind, id: EntityId) -> Result<(), ClientError> {
        let event = match kind {
            EntityKind::Monitor => "deleteMonitor",
            EntityKind::Notification => "deleteNotification",
        };
        self.write(event, vec![Json::from(id)]).await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        if let Err(e) = self.send(&Packet::Disconnect).await {
            debug!(endpoint = %self.label, error = %e, "kuma: namespace disconnect not sent");
        }
        self.closed = true;
        self.ws
            .close(None)
            .await
            .map_err(|e| ClientError::Protocol(format!("websocket close: {e}")))?;
        debug!(endpoint = %self.label, "kuma: disconnected");
        Ok(())
    }
}

fn ack_message(resp: &Json) -> String {
    resp.get("msg")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("unexpected response: {resp}"))
}

fn truthy(v: &Json) -> bool {
    match v {
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}

/// `{ "3": true, "5": false }` or `[3]` into an ordered id list.
fn id_list_from_wire(v: &Json) -> Vec<EntityId> {
    match v {
        Json::Array(items) => items.iter().filter_map(id_from_json).collect(),
        Json::Object(map) => {
            let mut ids: Vec<EntityId> = map
                .iter()
                .filter(|(_, on)| truthy(on))
                .filter_map(|(k, _)| k.parse().ok())
                .collect();
            ids.sort_unstable();
            ids
        }
        _ => Vec::new(),
    }
}

/// Monitor list arrives as an object keyed by id; order by numeric id.
fn monitors_from_wire(v: &Json) -> Result<Vec<Record>, ClientError> {
    let rows: Vec<(EntityId, &Json)> = match v {
        Json::Object(map) => map
            .iter()
            .filter_map(|(k, m)| k.parse().ok().or_else(|| m.get("id").and_then(id_from_json)).map(|id| (id, m)))
            .collect(),
        Json::Array(items) => items.iter().filter_map(|m| m.get("id").and_then(id_from_json).map(|id| (id, m))).collect(),
        Json::Null => Vec::new(),
        other => return Err(ClientError::Protocol(format!("monitorList: unexpected payload {other}"))),
    };
    let mut out: Vec<(EntityId, Record)> = Vec::with_capacity(rows.len());
    for (id, raw) in rows {
        let Json::Object(map) = raw else {
            warn!(id, "kuma: skipping non-object monitor row");
            continue;
        };
        let mut fields = map.clone();
        fields.insert("id".into(), Json::from(id));
        if let Some(list) = fields.get("notificationIDList") {
            let ids = id_list_from_wire(list);
            fields.insert("notificationIDList".into(), Json::from(ids));
        }
        out.push((id, Record::new(fields)));
    }
    out.sort_by_key(|(id, _)| *id);
    Ok(out.into_iter().map(|(_, r)| r).collect())
}

/// Replace cached monitors by id, add new ones, keep numeric id order.
fn upsert_monitors(cache: &mut Vec<Record>, rows: Vec<Record>) {
    for row in rows {
        match cache.iter_mut().find(|r| r.id().is_some() && r.id() == row.id()) {
            Some(slot) => *slot = row,
            None => cache.push(row),
        }
    }
    cache.sort_by_key(|r| r.id());
}

/// Notification rows carry their provider settings as a JSON string in `config`.
fn notifications_from_wire(v: &Json) -> Result<Vec<Record>, ClientError> {
    let rows = match v {
        Json::Array(items) => items,
        Json::Null => return Ok(Vec::new()),
        other => return Err(ClientError::Protocol(format!("notificationList: unexpected payload {other}"))),
    };
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Json::Object(row) = row else { continue };
        let mut config = match row.get("config") {
            Some(Json::String(s)) => match serde_json::from_str::<Json>(s) {
                Ok(Json::Object(map)) => map,
                _ => {
                    warn!(name = ?row.get("name"), "kuma: unparseable notification config");
                    Fields::new()
                }
            },
            Some(Json::Object(map)) => map.clone(),
            _ => Fields::new(),
        };
        let mut fields = Fields::new();
        for key in ["id", "name"] {
            if let Some(v) = row.get(key) {
                fields.insert(key.into(), v.clone());
            }
        }
        if let Some(t) = config.get("type").or_else(|| row.get("type")) {
            fields.insert("type".into(), t.clone());
        }
        let active = row.get("active").map(truthy).unwrap_or(true);
        let is_default = row.get("isDefault").or_else(|| row.get("is_default")).map(truthy).unwrap_or(false);
        fields.insert("active".into(), Json::Bool(active));
        fields.insert("isDefault".into(), Json::Bool(is_default));
        config.retain(|k, _| !NOTIFICATION_ENVELOPE.contains(&k.as_str()));
        fields.insert("config".into(), Json::Object(config));
        out.push(Record::new(fields));
    }
    Ok(out)
}

fn monitor_to_wire(fields: &Fields) -> Fields {
    let mut out = fields.clone();
    if let Some(list) = fields.get("notificationIDList") {
        let map: Fields = id_list_from_wire(list).into_iter().map(|id| (id.to_string(), Json::Bool(true))).collect();
        out.insert("notificationIDList".into(), Json::Object(map));
    }
    out
}

/// Flatten the opaque config bag back next to the envelope fields, envelope winning.
fn notification_to_wire(fields: &Fields) -> Fields {
    let mut out = match fields.get("config") {
        Some(Json::Object(cfg)) => cfg.clone(),
        _ => Fields::new(),
    };
    for (k, v) in fields {
        if k != "config" && k != "id" {
            out.insert(k.clone(), v.clone());
        }
    }
    out.entry("applyExisting").or_insert(Json::Bool(false));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_maps_schemes() {
        assert_eq!(socket_url("http://kuma:3001/").unwrap(), "ws://kuma:3001/socket.io/?EIO=4&transport=websocket");
        assert_eq!(socket_url("https://kuma.example").unwrap(), "wss://kuma.example/socket.io/?EIO=4&transport=websocket");
        assert!(socket_url("ftp://nope").is_err());
    }

    #[test]
    fn monitor_list_is_ordered_numerically_with_id_lists() {
        let v = json!({
            "10": { "id": 10, "name": "b", "notificationIDList": { "4": true, "2": true, "9": false } },
            "2": { "id": 2, "name": "a", "notificationIDList": {} }
        });
        let list = monitors_from_wire(&v).unwrap();
        assert_eq!(list.iter().map(|r| r.name().unwrap()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(list[1].get("notificationIDList"), Some(&json!([2, 4])));
    }

    #[test]
    fn notification_rows_split_config_from_envelope() {
        let v = json!([{
            "id": 7,
            "name": "slack-ops",
            "active": 1,
            "isDefault": 0,
            "userId": 1,
            "config": "{\"name\":\"slack-ops\",\"type\":\"slack\",\"slackwebhookURL\":\"https://hooks\",\"isDefault\":false,\"applyExisting\":true}"
        }]);
        let list = notifications_from_wire(&v).unwrap();
        assert_eq!(list.len(), 1);
        let n = &list[0];
        assert_eq!(n.id(), Some(7));
        assert_eq!(n.get("type"), Some(&json!("slack")));
        assert_eq!(n.get("active"), Some(&json!(true)));
        assert_eq!(n.get("isDefault"), Some(&json!(false)));
        assert_eq!(n.get("config"), Some(&json!({ "slackwebhookURL": "https://hooks" })));
    }

    #[test]
    fn writes_convert_wire_shapes() {
        let mut m = Fields::new();
        m.insert("name".into(), json!("web1"));
        m.insert("notificationIDList".into(), json!([3, 1]));
        let wire = monitor_to_wire(&m);
        assert_eq!(wire["notificationIDList"], json!({ "1": true, "3": true }));

        let mut n = Fields::new();
        n.insert("name".into(), json!("slack-ops"));
        n.insert("type".into(), json!("slack"));
        n.insert("config".into(), json!({ "slackwebhookURL": "https://hooks", "name": "stale" }));
        let wire = notification_to_wire(&n);
        assert_eq!(wire["name"], json!("slack-ops"));
        assert_eq!(wire["slackwebhookURL"], json!("https://hooks"));
        assert_eq!(wire["applyExisting"], json!(false));
        assert!(wire.get("config").is_none());
    }
    #[test]
    fn upserted_monitors_replace_by_id_and_stay_ordered() {
        let mut cache = monitors_from_wire(&json!({ "2": { "name": "a" }, "5": { "name": "c" } })).unwrap();
        let rows = monitors_from_wire(&json!({ "5": { "name": "c2" }, "3": { "name": "b" } })).unwrap();
        upsert_monitors(&mut cache, rows);
        let names: Vec<_> = cache.iter().map(|r| r.name().unwrap().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c2"]);
    }

    mod session {
        use super::*;
        use crate::Credentials;
        use futures::{SinkExt, StreamExt};
        use std::future::Future;
        use tokio::net::TcpListener;

        type ServerWs = WebSocketStream<TcpStream>;

        /// Serve one scripted Socket.IO session on a loopback port.
        async fn fake_kuma<F, Fut>(timeout: Duration, script: F) -> (Endpoint, tokio::task::JoinHandle<()>)
        where
            F: FnOnce(ServerWs) -> Fut + Send + 'static,
            Fut: Future<Output = ()> + Send + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let server = tokio::spawn(async move {
                let (tcp, _) = listener.accept().await.unwrap();
                let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                script(ws).await;
            });
            let ep = Endpoint::new("fake", format!("http://{addr}"), Credentials::new("admin", "pw")).with_timeout(timeout);
            (ep, server)
        }

        async fn say(ws: &mut ServerWs, packet: Packet) {
            ws.send(WsMessage::Text(packet.encode().into())).await.unwrap();
        }

        async fn push(ws: &mut ServerWs, name: &str, payload: Json) {
            say(ws, Packet::Event { ack: None, name: name.into(), args: vec![payload] }).await;
        }

        async fn reply(ws: &mut ServerWs, id: u64, payload: Json) {
            say(ws, Packet::Ack { id, args: vec![payload] }).await;
        }

        async fn heard(ws: &mut ServerWs) -> Packet {
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Text(t))) => return Packet::decode(t.as_str()).unwrap(),
                    Some(Ok(_)) => continue,
                    other => panic!("client went away: {other:?}"),
                }
            }
        }

        async fn expect_emit(ws: &mut ServerWs, event: &str) -> (u64, Vec<Json>) {
            match heard(ws).await {
                Packet::Event { ack: Some(id), name, args } if name == event => (id, args),
                other => panic!("expected `{event}` emit, got {other:?}"),
            }
        }

        /// Engine.IO open with a ping before the namespace connect is answered.
        async fn greet(ws: &mut ServerWs) {
            say(ws, Packet::Open(json!({ "sid": "s1", "pingInterval": 25000, "pingTimeout": 20000 }))).await;
            say(ws, Packet::Ping).await;
            assert_eq!(heard(ws).await, Packet::Connect(Json::Null));
            assert_eq!(heard(ws).await, Packet::Pong);
            say(ws, Packet::Connect(json!({ "sid": "n1" }))).await;
        }

        async fn accept_login(ws: &mut ServerWs) {
            let (id, args) = expect_emit(ws, "login").await;
            assert_eq!(args[0]["username"], json!("admin"));
            assert_eq!(args[0]["password"], json!("pw"));
            reply(ws, id, json!({ "ok": true, "token": "t" })).await;
        }

        async fn drain(mut ws: ServerWs) {
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        }

        #[tokio::test]
        async fn full_session_lists_writes_and_disconnects() {
            let (ep, server) = fake_kuma(Duration::from_secs(5), |mut ws| async move {
                greet(&mut ws).await;
                accept_login(&mut ws).await;
                push(
                    &mut ws,
                    MONITOR_LIST,
                    json!({ "3": { "id": 3, "name": "web1", "type": "http", "url": "https://x", "notificationIDList": {} } }),
                )
                .await;
                push(&mut ws, NOTIFICATION_LIST, json!([])).await;

                let (id, args) = expect_emit(&mut ws, "addNotification").await;
                assert_eq!(args[0]["name"], json!("slack-ops"));
                assert_eq!(args[0]["slackwebhookURL"], json!("https://hooks"));
                assert_eq!(args[1], Json::Null);
                reply(&mut ws, id + 40, json!({ "ok": true })).await;
                push(
                    &mut ws,
                    NOTIFICATION_LIST,
                    json!([{ "id": 5, "name": "slack-ops", "active": 1, "isDefault": 0,
                             "config": "{\"type\":\"slack\",\"slackwebhookURL\":\"https://hooks\"}" }]),
                )
                .await;
                reply(&mut ws, id, json!({ "ok": true, "msg": "Saved.", "id": 5 })).await;

                let (id, args) = expect_emit(&mut ws, "add").await;
                assert_eq!(args[0]["notificationIDList"], json!({ "5": true }));
                push(&mut ws, MONITOR_UPSERT, json!({ "4": { "id": 4, "name": "db", "type": "port" } })).await;
                push(&mut ws, MONITOR_REMOVE, json!(3)).await;
                reply(&mut ws, id, json!({ "ok": false, "msg": "bad monitor" })).await;

                assert_eq!(heard(&mut ws).await, Packet::Disconnect);
                drain(ws).await;
            })
            .await;

            let mut client = KumaClient::connect(&ep).await.unwrap();
            let monitors = client.list(EntityKind::Monitor).await.unwrap();
            assert_eq!(monitors.len(), 1);
            assert_eq!(monitors[0].name(), Some("web1"));
            assert!(client.list(EntityKind::Notification).await.unwrap().is_empty());

            let mut n = Fields::new();
            n.insert("name".into(), json!("slack-ops"));
            n.insert("type".into(), json!("slack"));
            n.insert("config".into(), json!({ "slackwebhookURL": "https://hooks" }));
            assert_eq!(client.create(EntityKind::Notification, &n).await.unwrap(), 5);
            let notifications = client.list(EntityKind::Notification).await.unwrap();
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].id(), Some(5));
            assert_eq!(notifications[0].get("type"), Some(&json!("slack")));

            let mut m = Fields::new();
            m.insert("name".into(), json!("db"));
            m.insert("type".into(), json!("port"));
            m.insert("notificationIDList".into(), json!([5]));
            let err = client.create(EntityKind::Monitor, &m).await.unwrap_err();
            assert!(matches!(err, ClientError::Rejected(ref msg) if msg == "bad monitor"), "{err}");
            let names: Vec<_> = client
                .list(EntityKind::Monitor)
                .await
                .unwrap()
                .iter()
                .map(|r| r.name().unwrap().to_string())
                .collect();
            assert_eq!(names, vec!["db"]);

            client.disconnect().await.unwrap();
            assert!(matches!(client.list(EntityKind::Monitor).await, Err(ClientError::Closed)));
            server.await.unwrap();
        }

        #[tokio::test]
        async fn refused_login_is_an_auth_error() {
            let (ep, server) = fake_kuma(Duration::from_secs(5), |mut ws| async move {
                greet(&mut ws).await;
                let (id, _) = expect_emit(&mut ws, "login").await;
                reply(&mut ws, id, json!({ "ok": false, "msg": "Incorrect username or password." })).await;
                drain(ws).await;
            })
            .await;

            let err = KumaClient::connect(&ep).await.err().unwrap();
            assert!(matches!(err, ClientError::Auth(ref msg) if msg == "Incorrect username or password."), "{err}");
            server.await.unwrap();
        }

        #[tokio::test]
        async fn silent_server_times_out_each_wait() {
            let (ep, server) = fake_kuma(Duration::from_millis(300), |mut ws| async move {
                greet(&mut ws).await;
                accept_login(&mut ws).await;
                expect_emit(&mut ws, "addNotification").await;
                drain(ws).await;
            })
            .await;

            let mut client = KumaClient::connect(&ep).await.unwrap();
            let err = client.list(EntityKind::Monitor).await.unwrap_err();
            assert!(matches!(err, ClientError::Timeout { ref waiting_for, .. } if waiting_for == MONITOR_LIST), "{err}");

            let mut n = Fields::new();
            n.insert("name".into(), json!("hook"));
            n.insert("type".into(), json!("webhook"));
            let err = client.create(EntityKind::Notification, &n).await.unwrap_err();
            assert!(
                matches!(err, ClientError::Timeout { after, ref waiting_for } if after == Duration::from_millis(300) && waiting_for == "addNotification"),
                "{err}"
            );
            drop(client);
            server.await.unwrap();
        }
    }
}
