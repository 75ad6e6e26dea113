//! Generation API server lifecycle: bind → spawn background task → return
//! a handle with a shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::generation_router;
use crate::pipeline::GenerationHandler;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Failed to read server address: {0}")]
    LocalAddr(std::io::Error),
}

/// Metadata for a running server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSession {
    pub server_addr: String,
    pub port: u16,
}

/// Handle to a running server.
pub struct GenerationServer {
    pub session: ServerSession,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl GenerationServer {
    /// Signal a graceful shutdown. In-flight streams are allowed to finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Generation server shutdown signal sent");
        }
    }

    /// Wait until the server task exits.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Generation server task failed: {e}");
        }
    }
}

/// Bind `addr` (port 0 picks an ephemeral port) and serve in the background.
pub async fn start_server(
    handler: Arc<GenerationHandler>,
    addr: SocketAddr,
) -> Result<GenerationServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let app = generation_router(handler);

    let session = ServerSession {
        server_addr: addr.to_string(),
        port: addr.port(),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Generation server received shutdown signal");
        };

        tracing::info!(%addr, "Generation server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Generation server error: {e}");
        }

        tracing::info!("Generation server stopped");
    });

    Ok(GenerationServer {
        session,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}
