//! Win-condition evaluation.
//!
//! With `A` alive Aggressors and `O` alive non-Aggressors:
//! - `A == 0`: Bystander faction wins
//! - `A >= O`: Aggressor faction wins (parity is enough)
//! - otherwise the game continues

use dusk_protocol::{Faction, Role};

use crate::PeerDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Over(Faction),
}

impl Verdict {
    pub fn is_over(&self) -> bool {
        matches!(self, Self::Over(_))
    }

    pub fn winner(&self) -> Option<Faction> {
        match self {
            Self::Continue => None,
            Self::Over(faction) => Some(*faction),
        }
    }
}

/// Decide whether the game is over for the current directory state.
pub fn evaluate(directory: &PeerDirectory) -> Verdict {
    let aggressors = directory.count_alive(Role::Aggressor);
    let others = directory.count_alive_except(Role::Aggressor);

    if aggressors == 0 {
        Verdict::Over(Faction::Bystander)
    } else if aggressors >= others {
        Verdict::Over(Faction::Aggressor)
    } else {
        Verdict::Continue
    }
}
