//! Running a configured node.
//!
//! A coordinator waits out the startup delay, then plays one game against
//! the configured peers. A peer serves its [`PeerAgent`] over JSON-RPC until
//! the game result arrives or the shutdown hook fires.

use std::sync::Arc;

use dusk_network::{Dispatcher, NetworkError, PeerRegistry, RpcServer, TcpTransport};
use dusk_protocol::GameOutcome;

use crate::agent::PeerAgent;
use crate::config::{ConfigError, NodeConfig, NodeMode};
use crate::policy::policy_from_config;
use crate::session::{GameSession, SessionError, SessionSettings};
use crate::shutdown::ShutdownHandle;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

fn dispatcher(config: &NodeConfig) -> Dispatcher {
    let registry = Arc::new(PeerRegistry::new(config.peers.clone()));
    Dispatcher::new(Arc::new(TcpTransport::new(registry)))
}

/// Run the node described by `config` until its work is done.
///
/// Returns the game outcome on a coordinator, `None` on a peer.
pub async fn run(config: NodeConfig, shutdown: ShutdownHandle) -> Result<Option<GameOutcome>, NodeError> {
    config.validate()?;
    match config.mode {
        NodeMode::Coordinator => run_coordinator(config, shutdown).await.map(Some),
        NodeMode::Peer => run_peer(config, shutdown).await.map(|()| None),
    }
}

pub async fn run_coordinator(config: NodeConfig, shutdown: ShutdownHandle) -> Result<GameOutcome, NodeError> {
    let players = config.peer_names();
    tracing::info!(
        name = %config.name,
        players = players.len(),
        delay_ms = config.game.startup_delay_ms,
        "Coordinator starting"
    );

    tokio::select! {
        _ = tokio::time::sleep(config.game.startup_delay()) => {}
        _ = shutdown.wait() => {
            return Err(SessionError::Cancelled {
                round: 0,
                phase: crate::session::Phase::AssignRoles,
            }
            .into());
        }
    }

    let mut session = GameSession::new(
        config.name.clone(),
        players,
        dispatcher(&config),
        SessionSettings::from(&config.game),
        shutdown,
    );
    let outcome = session.run().await?;
    tracing::info!(winner = %outcome.winner, rounds = outcome.rounds, "Game finished");
    Ok(outcome)
}

pub async fn run_peer(config: NodeConfig, shutdown: ShutdownHandle) -> Result<(), NodeError> {
    let policy = policy_from_config(&config.policy, config.game.seed);
    tracing::info!(name = %config.name, policy = policy.name(), "Peer starting");

    let agent = PeerAgent::new(config.name.clone(), policy, shutdown.clone())
        .with_coordinator(config.coordinator.clone())
        .with_dispatcher(dispatcher(&config), config.game.chat_timeout())
        .with_known_peers(&config.peer_names());

    let server = RpcServer::bind(&config.listen, Arc::new(agent), config.max_connections).await?;
    server.run(shutdown.wait()).await?;
    tracing::info!(name = %config.name, "Peer stopped");
    Ok(())
}
