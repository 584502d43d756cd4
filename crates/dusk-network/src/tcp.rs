//! Newline-delimited JSON-RPC 2.0 over TCP.
//!
//! One connection per call: write a single request line, read a single
//! response line, close.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use dusk_protocol::{Envelope, PeerName, RpcRequest, RpcResponse};

use crate::registry::PeerRegistry;
use crate::transport::Transport;
use crate::{NetworkError, TransportError};

pub struct TcpTransport {
    registry: Arc<PeerRegistry>,
}

impl TcpTransport {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    async fn call(
        &self,
        peer: &PeerName,
        envelope: Envelope,
    ) -> Result<serde_json::Value, TransportError> {
        let addr = self.registry.resolve(peer).await.map_err(|e| match e {
            NetworkError::NotFound(name) => TransportError::NotFound(name),
            other => TransportError::Unreachable(other.to_string()),
        })?;

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Unreachable(format!("{addr}: {e}")))?;

        let request = RpcRequest::from_envelope(&envelope)?;
        let (reader, mut writer) = stream.into_split();
        let line = serde_json::to_string(&request)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut lines = BufReader::new(reader).lines();
        let Some(reply) = lines.next_line().await? else {
            return Err(TransportError::Closed);
        };

        let response: RpcResponse = serde_json::from_str(&reply)?;
        if let Some(err) = response.error {
            return Err(TransportError::Remote(format!("{} ({})", err.message, err.code)));
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

impl Transport for TcpTransport {
    fn send<'a>(
        &'a self,
        peer: &'a PeerName,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, TransportError>> + Send + 'a>> {
        Box::pin(self.call(peer, envelope))
    }
}
