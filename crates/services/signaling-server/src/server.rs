//! WebSocket signaling server and its shutdown handle

use crate::config::ServerConfig;
use crate::handler::{handle_connection, SharedState};
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// WebSocket signaling server
pub struct SignalingServer {
    config: ServerConfig,
    state: Arc<SharedState>,
}

impl SignalingServer {
    /// Create a server from a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(SharedState::new(config.clone()));
        Ok(Self { config, state })
    }

    /// Shared state (for inspection)
    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// Bind the listener and spawn the accept loop
    ///
    /// Returns once the listener is bound, so the handle's address is ready
    /// for clients.
    pub async fn start(self) -> Result<SignalingServerHandle> {
        let listener = TcpListener::bind(self.config.socket_addr()?).await?;
        let local_addr = listener.local_addr()?;
        info!("Signaling server listening on ws://{}", local_addr);

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let connection_shutdown = shutdown_tx.clone();
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                let state = Arc::clone(&state);
                                let shutdown_rx = connection_shutdown.subscribe();
                                tokio::spawn(async move {
                                    let result =
                                        handle_connection(stream, state, shutdown_rx).await;
                                    if let Err(e) = result {
                                        error!(
                                            "Signaling connection error from {}: {}",
                                            peer_addr, e
                                        );
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Signaling server received shutdown signal");
                        break;
                    }
                }
            }

            info!("Signaling server accept loop exited");
        });

        Ok(SignalingServerHandle {
            local_addr,
            state: self.state,
            shutdown_tx,
            task: Some(task),
        })
    }
}

/// Handle for a running signaling server
pub struct SignalingServerHandle {
    local_addr: SocketAddr,
    state: Arc<SharedState>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl SignalingServerHandle {
    /// Bound address (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL clients connect to
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Shared state (for inspection)
    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// Stop accepting, close open connections and wait for the accept loop
    pub async fn shutdown(mut self) {
        info!("Shutting down signaling server");
        let _ = self.shutdown_tx.send(());

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Signaling server task failed: {}", e);
            }
        }
    }
}
