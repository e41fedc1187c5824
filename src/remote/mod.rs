//! Remote engine endpoints and the single "active" selection.

pub mod verify;

use serde::{Deserialize, Serialize};

pub use verify::{RemoteVerifier, VerifyResult, VerifyStatus};

/// Port the engine gateway listens on unless configured otherwise.
pub const DEFAULT_GATEWAY_PORT: u16 = 18790;

/// A named remote engine endpoint. Identity is `id`; everything else is
/// replaced wholesale when the same id is added again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConnection {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token presented to the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
}

fn default_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

impl RemoteConnection {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Name to show in lists, falling back to `host:port`.
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("{}:{}", self.host, self.port)
        } else {
            self.name.clone()
        }
    }
}

/// In-memory authority over the stored endpoints.
///
/// `active_id` is a weak reference: it may name an id that is no longer
/// stored, in which case there is simply no active connection.
pub struct RemoteConnectionManager {
    connections: Vec<RemoteConnection>,
    active_id: Option<String>,
    verifier: RemoteVerifier,
}

impl RemoteConnectionManager {
    pub fn new(verifier: RemoteVerifier) -> Self {
        Self {
            connections: Vec::new(),
            active_id: None,
            verifier,
        }
    }

    /// Seed from persisted config.
    pub fn with_connections(
        verifier: RemoteVerifier,
        connections: Vec<RemoteConnection>,
        active_id: Option<String>,
    ) -> Self {
        let mut manager = Self::new(verifier);
        manager.replace_all(connections);
        manager.active_id = active_id;
        manager
    }

    /// Upsert by id. An existing id keeps its position in the list.
    pub fn add_connection(&mut self, conn: RemoteConnection) {
        match self.connections.iter_mut().find(|c| c.id == conn.id) {
            Some(existing) => {
                tracing::info!("Updating remote connection '{}'", conn.id);
                *existing = conn;
            }
            None => {
                tracing::info!(
                    "Adding remote connection '{}' ({})",
                    conn.id,
                    conn.base_url()
                );
                self.connections.push(conn);
            }
        }
    }

    /// Remove by id; clears the active selection if it pointed here.
    /// Returns whether anything was removed.
    pub fn remove_connection(&mut self, id: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != id);
        let removed = self.connections.len() != before;

        if self.active_id.as_deref() == Some(id) {
            tracing::info!("Active remote connection '{}' removed, clearing selection", id);
            self.active_id = None;
        }
        removed
    }

    /// Replace the stored set, e.g. after a config merge. Later duplicates
    /// of an id overwrite earlier ones. The active selection is kept as is.
    pub fn replace_all(&mut self, connections: Vec<RemoteConnection>) {
        self.connections.clear();
        for conn in connections {
            self.add_connection(conn);
        }
    }

    /// Trusts the caller: `id` does not have to be stored yet.
    pub fn set_active(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.get(&id).is_none() {
            tracing::warn!("Active remote connection set to unknown id '{}'", id);
        }
        self.active_id = Some(id);
    }

    pub fn get_active(&self) -> Option<&RemoteConnection> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    /// The raw selector, possibly stale.
    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&RemoteConnection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn list(&self) -> Vec<RemoteConnection> {
        self.connections.clone()
    }

    /// Probe `conn` without touching the stored set; `conn` need not be stored.
    pub async fn verify(&self, conn: &RemoteConnection) -> VerifyResult {
        self.verifier.verify(conn).await
    }

    /// A handle for probing without holding on to the manager.
    pub fn verifier(&self) -> RemoteVerifier {
        self.verifier.clone()
    }
}
