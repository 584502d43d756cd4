use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use dusk_protocol::{PeerName, Role};

use crate::StateError;

/// One participant as the coordinator sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub name: PeerName,
    pub role: Role,
    pub alive: bool,
}

/// Insertion-ordered registry of players.
///
/// Iteration order is registration order so broadcasts and tallies are
/// reproducible. Records are never removed; elimination only clears `alive`.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    /// Coordinator name; never accepted as a player.
    reserved: PeerName,
    peers: Vec<Peer>,
    index: HashMap<PeerName, usize>,
}

impl PeerDirectory {
    pub fn new(reserved: PeerName) -> Self {
        Self {
            reserved,
            peers: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn reserved_name(&self) -> &PeerName {
        &self.reserved
    }

    /// Register a live player with its role.
    pub fn register(&mut self, name: PeerName, role: Role) -> Result<(), StateError> {
        self.check_registrable(&name)?;
        self.index.insert(name.clone(), self.peers.len());
        self.peers.push(Peer {
            name,
            role,
            alive: true,
        });
        Ok(())
    }

    /// Check whether `name` could be registered, without registering it.
    pub fn check_registrable(&self, name: &PeerName) -> Result<(), StateError> {
        if name == &self.reserved {
            return Err(StateError::ReservedName(name.clone()));
        }
        if self.index.contains_key(name) {
            return Err(StateError::DuplicatePeer(name.clone()));
        }
        Ok(())
    }

    pub fn get(&self, name: &PeerName) -> Result<&Peer, StateError> {
        self.index
            .get(name)
            .map(|&i| &self.peers[i])
            .ok_or_else(|| StateError::NotFound(name.clone()))
    }

    pub fn contains(&self, name: &PeerName) -> bool {
        self.index.contains_key(name)
    }

    pub fn role_of(&self, name: &PeerName) -> Option<Role> {
        self.get(name).ok().map(|p| p.role)
    }

    pub fn is_alive(&self, name: &PeerName) -> bool {
        self.get(name).map(|p| p.alive).unwrap_or(false)
    }

    /// Alive players, optionally restricted to one role, in registration order.
    pub fn alive_peers(&self, filter: Option<Role>) -> Vec<PeerName> {
        self.peers
            .iter()
            .filter(|p| p.alive)
            .filter(|p| filter.map_or(true, |role| p.role == role))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Every registered player, dead or alive, in registration order.
    pub fn all_peers(&self) -> Vec<PeerName> {
        self.peers.iter().map(|p| p.name.clone()).collect()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    /// Mark a player as eliminated.
    ///
    /// Idempotent: an unknown or already-dead name changes nothing. Returns
    /// whether the player was alive before the call.
    pub fn eliminate(&mut self, name: &PeerName) -> bool {
        match self.index.get(name) {
            Some(&i) if self.peers[i].alive => {
                self.peers[i].alive = false;
                tracing::debug!(peer = %name, role = %self.peers[i].role, "Peer eliminated");
                true
            }
            _ => false,
        }
    }

    pub fn count_alive(&self, role: Role) -> usize {
        self.peers.iter().filter(|p| p.alive && p.role == role).count()
    }

    /// Alive players whose role is not `role`.
    pub fn count_alive_except(&self, role: Role) -> usize {
        self.peers.iter().filter(|p| p.alive && p.role != role).count()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
