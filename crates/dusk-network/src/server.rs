//! JSON-RPC 2.0 server over TCP.
//!
//! Each line received is a request carrying one envelope; each line sent back
//! is the response. Every inbound envelope is handed to a single
//! [`MessageHandler`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use dusk_protocol::messages::rpc_codes;
use dusk_protocol::{ProtocolError, RpcRequest, RpcResponse};

use crate::transport::MessageHandler;
use crate::NetworkError;

pub struct RpcServer {
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
    /// Maximum concurrent connections.
    max_connections: usize,
}

impl RpcServer {
    /// Bind the listener. Use port 0 to let the OS pick one.
    pub async fn bind(
        bind_addr: &str,
        handler: Arc<dyn MessageHandler>,
        max_connections: usize,
    ) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| NetworkError::Bind(format!("{bind_addr}: {e}")))?;
        Ok(Self {
            listener,
            handler,
            max_connections: max_connections.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run<S>(self, shutdown: S) -> Result<(), NetworkError>
    where
        S: Future<Output = ()> + Send,
    {
        let addr = self.local_addr()?;
        tracing::info!(addr = %addr, "JSON-RPC server listening");

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_connections));
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(addr = %addr, "JSON-RPC server stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted?,
            };
            tracing::debug!(peer = %peer_addr, "RPC client connected");

            let permit = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(addr = %addr, "JSON-RPC server stopping");
                    return Ok(());
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return Ok(()),
                },
            };
            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handler).await {
                    tracing::warn!(peer = %peer_addr, error = %e, "RPC connection error");
                }
                drop(permit);
            });
        }
    }
}

/// Read newline-delimited requests and answer each one in order.
async fn handle_connection(
    stream: TcpStream,
    handler: Arc<dyn MessageHandler>,
) -> Result<(), NetworkError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_request(&line, handler.as_ref()).await;
        let response_json = serde_json::to_string(&response)
            .map_err(|e| NetworkError::Io(std::io::Error::other(e)))?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Decode one request line and run it through `handler`.
pub async fn process_request(request_str: &str, handler: &dyn MessageHandler) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(request_str) {
        Ok(r) => r,
        Err(e) => {
            return RpcResponse::error(None, rpc_codes::PARSE_ERROR, format!("Invalid JSON: {e}"));
        }
    };

    let envelope = match request.envelope() {
        Ok(envelope) => envelope,
        Err(ProtocolError::UnknownMethod(method)) => {
            return RpcResponse::error(
                request.id,
                rpc_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {method}"),
            );
        }
        Err(e) => {
            return RpcResponse::error(request.id, rpc_codes::INVALID_PARAMS, e.to_string());
        }
    };

    tracing::debug!(
        method = %request.method,
        from = %envelope.from,
        to = %envelope.to,
        "RPC request"
    );

    match handler.handle(envelope).await {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(e) => RpcResponse::error(request.id, rpc_codes::INTERNAL_ERROR, e.to_string()),
    }
}
