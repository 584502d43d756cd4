//! Role assignment.
//!
//! With `N` players:
//! - Aggressors: `max(1, floor(N / 3))`
//! - Investigators: exactly one
//! - Bystanders: everyone else
//!
//! Fewer than three players is rejected before anything is assigned.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use dusk_protocol::{PeerName, Role, MIN_PLAYERS};

use crate::{PeerDirectory, StateError};

/// How many players receive each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCounts {
    pub aggressors: usize,
    pub investigators: usize,
    pub bystanders: usize,
}

impl RoleCounts {
    pub fn for_players(total: usize) -> Result<Self, StateError> {
        if total < MIN_PLAYERS {
            return Err(StateError::InsufficientPlayers {
                required: MIN_PLAYERS,
                actual: total,
            });
        }
        let aggressors = (total / 3).max(1);
        let investigators = 1;
        Ok(Self {
            aggressors,
            investigators,
            bystanders: total - aggressors - investigators,
        })
    }

    pub fn total(&self) -> usize {
        self.aggressors + self.investigators + self.bystanders
    }
}

/// Computed roles, kept in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    entries: Vec<(PeerName, Role)>,
}

impl RoleAssignment {
    pub fn entries(&self) -> &[(PeerName, Role)] {
        &self.entries
    }

    pub fn role_of(&self, name: &PeerName) -> Option<Role> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, r)| *r)
    }

    pub fn counts(&self) -> RoleCounts {
        let count = |role: Role| self.entries.iter().filter(|(_, r)| *r == role).count();
        RoleCounts {
            aggressors: count(Role::Aggressor),
            investigators: count(Role::Investigator),
            bystanders: count(Role::Bystander),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register every assigned player in `directory`.
    ///
    /// All-or-nothing: every name is validated before the first one is
    /// registered, and an already-populated directory is refused.
    pub fn apply(&self, directory: &mut PeerDirectory) -> Result<(), StateError> {
        if !directory.is_empty() {
            return Err(StateError::AlreadyAssigned);
        }
        for (name, _) in &self.entries {
            directory.check_registrable(name)?;
        }
        for (name, role) in &self.entries {
            directory.register(name.clone(), *role)?;
        }
        Ok(())
    }
}

/// Assign roles to `names`, skipping the reserved coordinator name.
///
/// Which player gets which role is a uniform shuffle drawn from `rng`.
pub fn assign_roles<R: Rng + ?Sized>(
    names: &[PeerName],
    reserved: &PeerName,
    rng: &mut R,
) -> Result<RoleAssignment, StateError> {
    let players: Vec<PeerName> = names.iter().filter(|n| *n != reserved).cloned().collect();

    let mut seen = HashSet::new();
    for name in &players {
        if !seen.insert(name) {
            return Err(StateError::DuplicatePeer(name.clone()));
        }
    }

    let counts = RoleCounts::for_players(players.len())?;

    let mut order: Vec<usize> = (0..players.len()).collect();
    order.shuffle(rng);

    let mut roles = vec![Role::Bystander; players.len()];
    for (rank, &slot) in order.iter().enumerate() {
        roles[slot] = if rank < counts.aggressors {
            Role::Aggressor
        } else if rank < counts.aggressors + counts.investigators {
            Role::Investigator
        } else {
            Role::Bystander
        };
    }

    let entries: Vec<(PeerName, Role)> = players.into_iter().zip(roles).collect();

    tracing::info!(
        players = entries.len(),
        aggressors = counts.aggressors,
        investigators = counts.investigators,
        bystanders = counts.bystanders,
        "Roles assigned"
    );

    Ok(RoleAssignment { entries })
}
