//! Dusk Connector - coordinator and peer processes.
//!
//! - [`session`]: the phase state machine run by the coordinator
//! - [`agent`]: the peer-side responder
//! - [`policy`]: decision strategies behind a peer's choices
//! - [`config`]: TOML node configuration
//! - [`shutdown`]: the single-shot shutdown hook
//! - [`node`]: wiring a configured node onto the TCP transport

pub mod agent;
pub mod config;
pub mod node;
pub mod policy;
pub mod session;
pub mod shutdown;

pub use agent::{AgentState, PeerAgent};
pub use config::{ConfigError, NodeConfig, NodeMode};
pub use node::NodeError;
pub use policy::{BaselinePolicy, Decision, DecisionKind, DecisionPolicy, DecisionRequest, ExternalPolicy};
pub use session::{EliminationCause, GameSession, Phase, SessionError, SessionEvent, SessionSettings};
pub use shutdown::ShutdownHandle;
