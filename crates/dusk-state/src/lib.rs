//! Dusk State - the coordinator's authoritative view of the table.
//!
//! - [`directory`]: who is playing, with which role, and who is still alive
//! - [`roles`]: one-shot, all-or-nothing role assignment
//! - [`termination`]: pure win-condition evaluation over the directory

pub mod directory;
pub mod roles;
pub mod termination;

pub use directory::{Peer, PeerDirectory};
pub use roles::{assign_roles, RoleAssignment, RoleCounts};
pub use termination::{evaluate, Verdict};

use dusk_protocol::PeerName;

/// Errors produced by directory and role-assignment operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Insufficient players: need at least {required}, have {actual}")]
    InsufficientPlayers { required: usize, actual: usize },

    #[error("Peer not found: {0}")]
    NotFound(PeerName),

    #[error("Duplicate peer name: {0}")]
    DuplicatePeer(PeerName),

    #[error("Name is reserved for the coordinator: {0}")]
    ReservedName(PeerName),

    #[error("Roles already assigned")]
    AlreadyAssigned,
}
