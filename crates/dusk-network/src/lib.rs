//! Dusk Network - getting envelopes to peers and replies back.
//!
//! - [`transport`]: the `send(peer, envelope)` seam and the handler trait peers implement
//! - [`registry`]: lazy name → address resolution
//! - [`tcp`]: newline-delimited JSON-RPC 2.0 over TCP
//! - [`server`]: the matching JSON-RPC server
//! - [`local`]: in-process transport for tests and single-process tables
//! - [`dispatcher`]: concurrent fan-out with per-call timeouts

pub mod dispatcher;
pub mod local;
pub mod registry;
pub mod server;
pub mod tcp;
pub mod transport;

pub use dispatcher::{CallOutcome, DispatchResults, Dispatcher};
pub use local::LocalTransport;
pub use registry::{PeerEntry, PeerRegistry};
pub use server::RpcServer;
pub use tcp::TcpTransport;
pub use transport::{HandlerError, MessageHandler, Transport};

use dusk_protocol::{PeerName, ProtocolError};

/// Errors from a single `send` call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Peer not found: {0}")]
    NotFound(PeerName),

    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Peer returned an error: {0}")]
    Remote(String),

    #[error("Connection closed before a reply arrived")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether the failure means the peer could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Unreachable(_))
    }
}

/// Errors from the networking layer outside individual calls.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Peer not found: {0}")]
    NotFound(PeerName),

    #[error("Address resolution failed for {peer}: {reason}")]
    Resolve { peer: PeerName, reason: String },

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
