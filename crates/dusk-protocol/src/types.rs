use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Unique, stable name of a participant (or of the coordinator).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PeerName(String);

impl PeerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PeerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Closed set of roles a player can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Eliminates one player each night as a faction.
    Aggressor,
    /// Learns whether one player is an Aggressor each night.
    Investigator,
    /// No night action.
    Bystander,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressor => "aggressor",
            Self::Investigator => "investigator",
            Self::Bystander => "bystander",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, ProtocolError> {
        match s {
            "aggressor" => Ok(Self::Aggressor),
            "investigator" => Ok(Self::Investigator),
            "bystander" => Ok(Self::Bystander),
            other => Err(ProtocolError::UnknownRole(other.to_string())),
        }
    }

    /// Which side this role wins with.
    pub fn faction(&self) -> Faction {
        match self {
            Self::Aggressor => Faction::Aggressor,
            Self::Investigator | Self::Bystander => Faction::Bystander,
        }
    }

    /// Whether this role is woken up during the night.
    pub fn acts_at_night(&self) -> bool {
        !matches!(self, Self::Bystander)
    }

    /// Private briefing text sent alongside the role notice.
    pub fn briefing(&self) -> &'static str {
        match self {
            Self::Aggressor => "You are an Aggressor. Each night your faction removes one player.",
            Self::Investigator => "You are the Investigator. Each night you may learn whether one player is an Aggressor.",
            Self::Bystander => "You are a Bystander. Find the Aggressors through discussion and votes.",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two winning sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    /// Investigator and Bystanders.
    Bystander,
    /// The Aggressors.
    Aggressor,
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bystander => f.write_str("bystander faction"),
            Self::Aggressor => f.write_str("aggressor faction"),
        }
    }
}

/// Terminal value of a game run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub winner: Faction,
    /// Round in which the game ended.
    pub rounds: u32,
}

impl GameOutcome {
    pub fn bystanders_win(&self) -> bool {
        self.winner == Faction::Bystander
    }

    pub fn aggressors_win(&self) -> bool {
        self.winner == Faction::Aggressor
    }
}
