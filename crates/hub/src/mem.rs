//! In-memory directory with fault injection.
//!
//! A [`MemoryDirectory`] stands in for one instance. Handles are cheap clones over shared
//! state, so a test can keep one while the sync run owns a connected [`MemoryClient`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use kumasync_core::{ClientError, EntityId, EntityKind, Fields, Record};
use serde_json::Value as Json;
use tracing::debug;

use crate::{Connector, DirectoryClient, Endpoint};

/// Remote call observed by a directory, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(EntityKind),
    Create(EntityKind, String),
    Update(EntityKind, EntityId),
    Delete(EntityKind, EntityId),
}

#[derive(Debug, Default)]
struct State {
    monitors: Vec<Record>,
    notifications: Vec<Record>,
    next_id: EntityId,
    failing_connects: u32,
    connect_attempts: u32,
    disconnects: u32,
    failing_lists: HashSet<EntityKind>,
    failing_writes: HashSet<String>,
    calls: Vec<Call>,
}

impl State {
    fn items(&mut self, kind: EntityKind) -> &mut Vec<Record> {
        match kind {
            EntityKind::Monitor => &mut self.monitors,
            EntityKind::Notification => &mut self.notifications,
        }
    }

    fn alloc_id(&mut self) -> EntityId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a record with a freshly assigned id and return that id.
    pub fn seed(&self, kind: EntityKind, fields: Json) -> EntityId {
        let mut st = self.lock();
        let id = st.alloc_id();
        st.items(kind).push(record_with_id(id, object(fields)));
        id
    }

    /// Insert a record under a caller-chosen id. Later seeds continue after the highest id.
    pub fn seed_with_id(&self, kind: EntityKind, id: EntityId, fields: Json) {
        let mut st = self.lock();
        st.next_id = st.next_id.max(id);
        st.items(kind).push(record_with_id(id, object(fields)));
    }

    pub fn records(&self, kind: EntityKind) -> Vec<Record> {
        self.lock().items(kind).clone()
    }

    pub fn find(&self, kind: EntityKind, name: &str) -> Option<Record> {
        self.lock().items(kind).iter().find(|r| r.name() == Some(name)).cloned()
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_connects(&self, n: u32) {
        self.lock().failing_connects = n;
    }

    /// Make every `list(kind)` fail.
    pub fn fail_list(&self, kind: EntityKind) {
        self.lock().failing_lists.insert(kind);
    }

    /// Reject create/update calls carrying this entity name.
    pub fn fail_writes_for(&self, name: &str) {
        self.lock().failing_writes.insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn disconnects(&self) -> u32 {
        self.lock().disconnects
    }
}

fn object(v: Json) -> Fields {
    match v {
        Json::Object(map) => map,
        _ => Fields::new(),
    }
}

fn record_with_id(id: EntityId, mut fields: Fields) -> Record {
    fields.insert("id".into(), Json::from(id));
    Record::new(fields)
}

fn write_name(fields: &Fields) -> String {
    fields.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string()
}

/// Routes endpoint URLs to directories.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    directories: HashMap<String, MemoryDirectory>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, dir: MemoryDirectory) -> Self {
        self.directories.insert(url.into(), dir);
        self
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    type Client = MemoryClient;

    async fn connect(&self, endpoint: &Endpoint) -> Result<MemoryClient, ClientError> {
        let dir = self
            .directories
            .get(&endpoint.url)
            .cloned()
            .ok_or_else(|| ClientError::Connect(format!("connection refused: {}", endpoint.url)))?;
        {
            let mut st = dir.lock();
            st.connect_attempts += 1;
            if st.failing_connects > 0 {
                st.failing_connects -= 1;
                return Err(ClientError::Connect(format!("connection refused: {}", endpoint.url)));
            }
        }
        debug!(endpoint = %endpoint.label, "memory directory connected");
        Ok(MemoryClient { dir, open: true })
    }
}

/// Session on a [`MemoryDirectory`].
#[derive(Debug)]
pub struct MemoryClient {
    dir: MemoryDirectory,
    open: bool,
}

impl MemoryClient {
    fn session(&self) -> Result<MutexGuard<'_, State>, ClientError> {
        if !self.open {
            return Err(ClientError::Closed);
        }
        Ok(self.dir.lock())
    }
}

#[async_trait::async_trait]
impl DirectoryClient for MemoryClient {
    async fn list(&mut self, kind: EntityKind) -> Result<Vec<Record>, ClientError> {
        let mut st = self.session()?;
        st.calls.push(Call::List(kind));
        if st.failing_lists.contains(&kind) {
            return Err(ClientError::Protocol(format!("{kind} listing unavailable")));
        }
        Ok(st.items(kind).clone())
    }

    async fn create(&mut self, kind: EntityKind, fields: &Fields) -> Result<EntityId, ClientError> {
        let mut st = self.session()?;
        let name = write_name(fields);
        st.calls.push(Call::Create(kind, name.clone()));
        if st.failing_writes.contains(&name) {
            return Err(ClientError::Rejected(format!("{kind} `{name}` refused")));
        }
        let id = st.alloc_id();
        st.items(kind).push(record_with_id(id, fields.clone()));
        Ok(id)
    }

    async fn update(&mut self, kind: EntityKind, id: EntityId, fields: &Fields) -> Result<(), ClientError> {
        let mut st = self.session()?;
        st.calls.push(Call::Update(kind, id));
        if st.failing_writes.contains(&write_name(fields)) {
            return Err(ClientError::Rejected(format!("{kind} {id} refused")));
        }
        let rec = st
            .items(kind)
            .iter_mut()
            .find(|r| r.id() == Some(id))
            .ok_or(ClientError::NotFound { kind, id })?;
        for (k, v) in fields {
            rec.0.insert(k.clone(), v.clone());
        }
        rec.0.insert("id".into(), Json::from(id));
        Ok(())
    }

    async fn delete(&mut self, kind: EntityKind, id: EntityId) -> Result<(), ClientError> {
        let mut st = self.session()?;
        st.calls.push(Call::Delete(kind, id));
        let items = st.items(kind);
        let before = items.len();
        items.retain(|r| r.id() != Some(id));
        if items.len() == before {
            return Err(ClientError::NotFound { kind, id });
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        if self.open {
            self.open = false;
            self.dir.lock().disconnects += 1;
        }
        Ok(())
    }
}
