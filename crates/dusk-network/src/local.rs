//! In-process transport.
//!
//! Routes envelopes straight to registered [`MessageHandler`]s. A name with
//! no handler behaves like a peer that cannot be reached.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use dusk_protocol::{Envelope, PeerName};

use crate::transport::{MessageHandler, Transport};
use crate::TransportError;

#[derive(Default)]
pub struct LocalTransport {
    handlers: RwLock<HashMap<PeerName, Arc<dyn MessageHandler>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route envelopes addressed to `name` to `handler`, replacing any
    /// previous handler.
    pub fn register(&self, name: PeerName, handler: Arc<dyn MessageHandler>) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(name, handler);
        }
    }

    pub fn unregister(&self, name: &PeerName) -> bool {
        self.handlers
            .write()
            .map(|mut handlers| handlers.remove(name).is_some())
            .unwrap_or(false)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<PeerName> {
        let mut names: Vec<PeerName> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn handler(&self, name: &PeerName) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.read().ok()?.get(name).cloned()
    }
}

impl Transport for LocalTransport {
    fn send<'a>(
        &'a self,
        peer: &'a PeerName,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let handler = self
                .handler(peer)
                .ok_or_else(|| TransportError::NotFound(peer.clone()))?;
            handler
                .handle(envelope)
                .await
                .map_err(|e| TransportError::Remote(e.to_string()))
        })
    }
}
