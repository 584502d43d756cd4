//! Node configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or
//! no file at all) yields a runnable peer node.
//!
//! ```toml
//! name = "coordinator"
//! listen = "127.0.0.1:9400"
//! mode = "coordinator"
//!
//! [game]
//! call_timeout_ms = 10000
//! discussion_window_ms = 15000
//! startup_delay_ms = 2000
//! seed = 42
//!
//! [policy]
//! kind = "external"
//! command = "python3 decide.py"
//! timeout_ms = 5000
//!
//! [[peers]]
//! name = "alice"
//! addr = "127.0.0.1:9401"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dusk_network::PeerEntry;
use dusk_protocol::{
    PeerName, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_COORDINATOR_NAME, DEFAULT_DISCUSSION_WINDOW_MS,
    DEFAULT_LISTEN_ADDR, DEFAULT_STARTUP_DELAY_MS,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Whether this process drives the game or plays in it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NodeMode {
    Coordinator,
    #[default]
    Peer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_name")]
    pub name: PeerName,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub mode: NodeMode,
    /// Name the coordinator uses, so peers can leave it out of play.
    #[serde(default = "default_coordinator")]
    pub coordinator: PeerName,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_discussion_window_ms")]
    pub discussion_window_ms: u64,
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    /// Fixes every random choice (roles, tie-breaks, baseline decisions).
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Baseline,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub kind: PolicyKind,
    /// Program and arguments, whitespace separated. Required for `external`.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_policy_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_name() -> PeerName {
    PeerName::new("peer")
}

fn default_listen() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_coordinator() -> PeerName {
    PeerName::new(DEFAULT_COORDINATOR_NAME)
}

fn default_max_connections() -> usize {
    64
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

fn default_discussion_window_ms() -> u64 {
    DEFAULT_DISCUSSION_WINDOW_MS
}

fn default_startup_delay_ms() -> u64 {
    DEFAULT_STARTUP_DELAY_MS
}

fn default_policy_timeout_ms() -> u64 {
    5_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            listen: default_listen(),
            mode: NodeMode::default(),
            coordinator: default_coordinator(),
            max_connections: default_max_connections(),
            game: GameConfig::default(),
            policy: PolicyConfig::default(),
            peers: Vec::new(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            discussion_window_ms: default_discussion_window_ms(),
            startup_delay_ms: default_startup_delay_ms(),
            seed: None,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::default(),
            command: None,
            timeout_ms: default_policy_timeout_ms(),
        }
    }
}

impl GameConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn discussion_window(&self) -> Duration {
        Duration::from_millis(self.discussion_window_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Budget for peer-to-peer chatter, which has to fit inside one
    /// coordinator call.
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms / 2)
    }
}

impl PolicyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Program and arguments of the external command.
    pub fn command_line(&self) -> Option<(String, Vec<String>)> {
        let mut parts = self.command.as_deref()?.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some((program, parts.collect()))
    }
}

impl NodeConfig {
    /// `<config dir>/dusk/node.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dusk").join("node.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load `path` if given; otherwise the default path if it exists;
    /// otherwise built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => {
                tracing::debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.mode == NodeMode::Peer && self.name == self.coordinator {
            return Err(ConfigError::Invalid(format!(
                "peer name {} is reserved for the coordinator",
                self.name
            )));
        }
        if self.game.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("game.call_timeout_ms must be positive".into()));
        }
        if self.policy.kind == PolicyKind::External && self.policy.command_line().is_none() {
            return Err(ConfigError::Invalid(
                "policy.command is required for the external policy".into(),
            ));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if peer.name.is_empty() {
                return Err(ConfigError::Invalid("peer name must not be empty".into()));
            }
            if !seen.insert(&peer.name) {
                return Err(ConfigError::Invalid(format!("duplicate peer: {}", peer.name)));
            }
        }
        Ok(())
    }

    /// Configured peer names in declaration order.
    pub fn peer_names(&self) -> Vec<PeerName> {
        self.peers.iter().map(|p| p.name.clone()).collect()
    }
}
