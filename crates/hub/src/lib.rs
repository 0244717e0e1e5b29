//! kumasync hub: the remote directory boundary.
//!
//! Both instances are reached through the same [`Connector`] / [`DirectoryClient`] pair.
//! Clients own their session and take `&mut self`, so a connection never has more than one
//! outstanding call. Retries do not live here; see `kumasync-apply`.

#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use kumasync_core::{ClientError, EntityId, EntityKind, Fields, Record};

pub mod kuma;
pub mod mem;
pub mod packet;

pub use kuma::{KumaClient, KumaConnector};
pub use mem::{Call, MemoryClient, MemoryConnector, MemoryDirectory};

/// Default per-call timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One side of the sync: where it lives and how to log in.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Human label used in logs and fatal reports ("primary", "secondary").
    pub label: String,
    pub url: String,
    pub credentials: Credentials,
    /// Bound applied by the client to each connect and each round trip.
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(label: impl Into<String>, url: impl Into<String>, credentials: Credentials) -> Self {
        Self { label: label.into(), url: url.into(), credentials, timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// CRUD surface of one connected instance.
#[async_trait::async_trait]
pub trait DirectoryClient: Send {
    /// Current entities of `kind`, in the instance's own order.
    async fn list(&mut self, kind: EntityKind) -> Result<Vec<Record>, ClientError>;

    /// Create an entity and return the id the instance assigned.
    async fn create(&mut self, kind: EntityKind, fields: &Fields) -> Result<EntityId, ClientError>;

    /// Overwrite the entity `id` with `fields`.
    async fn update(&mut self, kind: EntityKind, id: EntityId, fields: &Fields) -> Result<(), ClientError>;

    async fn delete(&mut self, kind: EntityKind, id: EntityId) -> Result<(), ClientError>;

    /// Release the session. Further calls fail with [`ClientError::Closed`].
    async fn disconnect(&mut self) -> Result<(), ClientError>;
}

/// Opens an authenticated session against an endpoint (one attempt, no retry).
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Client: DirectoryClient;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Client, ClientError>;
}
