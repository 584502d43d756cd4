use std::future::Future;
use std::pin::Pin;

use dusk_protocol::{Envelope, PeerName};

use crate::TransportError;

/// Delivers one envelope to one peer and returns the peer's reply payload.
///
/// Implementations do not apply timeouts; the [`crate::Dispatcher`] bounds
/// every call.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        peer: &'a PeerName,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, TransportError>> + Send + 'a>>;
}

/// Failure reported by a handler while processing an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receiving side of a transport: turns an inbound envelope into a reply.
pub trait MessageHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'a>>;
}
