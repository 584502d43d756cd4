//! Peer name registry.
//!
//! Configured entries map a peer name to a `host:port` string. A name is
//! resolved to a socket address the first time it is used and the result is
//! cached for the rest of the run.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use dusk_protocol::PeerName;

use crate::NetworkError;

/// A configured peer: its name and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub name: PeerName,
    /// `host:port`, resolved lazily.
    pub addr: String,
}

impl PeerEntry {
    pub fn new(name: impl Into<PeerName>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

pub struct PeerRegistry {
    /// Configured entries in declaration order.
    entries: Vec<PeerEntry>,
    /// Addresses resolved so far.
    resolved: RwLock<HashMap<PeerName, SocketAddr>>,
}

impl PeerRegistry {
    pub fn new(entries: impl IntoIterator<Item = PeerEntry>) -> Self {
        let mut unique: Vec<PeerEntry> = Vec::new();
        for entry in entries {
            if unique.iter().any(|e| e.name == entry.name) {
                tracing::warn!(peer = %entry.name, "Duplicate registry entry ignored");
                continue;
            }
            unique.push(entry);
        }
        Self {
            entries: unique,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Configured peer names in declaration order.
    pub fn names(&self) -> Vec<PeerName> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn entries(&self) -> &[PeerEntry] {
        &self.entries
    }

    pub fn contains(&self, name: &PeerName) -> bool {
        self.entries.iter().any(|e| &e.name == name)
    }

    /// Resolve `name` to a socket address, looking it up on first use.
    pub async fn resolve(&self, name: &PeerName) -> Result<SocketAddr, NetworkError> {
        if let Some(addr) = self.resolved.read().await.get(name) {
            return Ok(*addr);
        }

        let entry = self
            .entries
            .iter()
            .find(|e| &e.name == name)
            .ok_or_else(|| NetworkError::NotFound(name.clone()))?;

        let addr = tokio::net::lookup_host(entry.addr.as_str())
            .await
            .map_err(|e| NetworkError::Resolve {
                peer: name.clone(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| NetworkError::Resolve {
                peer: name.clone(),
                reason: format!("no addresses for {}", entry.addr),
            })?;

        tracing::debug!(peer = %name, addr = %addr, "Resolved peer address");
        self.resolved.write().await.insert(name.clone(), addr);
        Ok(addr)
    }

    /// Whether `name` has already been resolved.
    pub async fn is_resolved(&self, name: &PeerName) -> bool {
        self.resolved.read().await.contains_key(name)
    }
}
