//! Per-connection WebSocket handling
//!
//! Each connection gets a fresh [`PeerId`], an outbound queue drained by a
//! writer task, and a read loop that dispatches client envelopes one at a
//! time. Disconnecting implies leaving the occupied room.

use crate::config::ServerConfig;
use crate::relay::Relay;
use crate::reports::ReportStore;
use crate::rooms::{Admission, PeerId};
use crate::Result;
use duet_core::protocol::{ClientMessage, ErrorCode, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// State shared by all connections
#[derive(Debug)]
pub struct SharedState {
    pub relay: Relay,
    pub reports: Option<ReportStore>,
    pub config: ServerConfig,
}

impl SharedState {
    /// Create shared state from a validated configuration
    pub fn new(config: ServerConfig) -> Self {
        let reports = config.report_dir.clone().map(ReportStore::new);
        Self {
            relay: Relay::new(),
            reports,
            config,
        }
    }
}

/// Per-connection bookkeeping owned by the read loop
struct Connection {
    peer: PeerId,
    room: Option<String>,
}

/// Serve one WebSocket connection until it closes or the server shuts down
#[instrument(skip_all, fields(peer_addr = ?stream.peer_addr().ok()))]
pub async fn handle_connection(
    stream: TcpStream,
    state: Arc<SharedState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    let mut conn = Connection {
        peer: Uuid::new_v4(),
        room: None,
    };
    info!(peer = %conn.peer, "Signaling connection opened");

    // Outbound queue drained by the writer task
    let (tx, mut rx) = mpsc::channel::<String>(state.config.outbound_buffer);
    state.relay.register(conn.peer, tx.clone());

    let ws_tx = Arc::new(Mutex::new(ws_tx));
    let writer_tx = Arc::clone(&ws_tx);
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            let mut ws_tx = writer_tx.lock().await;
            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_text(&text, &mut conn, &state, &tx).await {
                            error!(peer = %conn.peer, "Error handling message: {}", e);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let mut ws_tx = ws_tx.lock().await;
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(peer = %conn.peer, "Connection closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(peer = %conn.peer, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(peer = %conn.peer, "Server shutting down, closing connection");
                let mut ws_tx = ws_tx.lock().await;
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Disconnecting implies leaving
    if let Some(room) = conn.room.take() {
        if let Err(e) = state.relay.leave(&room, conn.peer).await {
            warn!(peer = %conn.peer, room_id = %room, "Failed to notify partner: {}", e);
        }
    }
    state.relay.unregister(conn.peer);
    writer.abort();

    info!(peer = %conn.peer, "Signaling connection closed");
    Ok(())
}

/// Dispatch one client frame
async fn handle_text(
    text: &str,
    conn: &mut Connection,
    state: &SharedState,
    tx: &mpsc::Sender<String>,
) -> Result<()> {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(peer = %conn.peer, "Malformed client message: {}", e);
            let message = ServerMessage::error(ErrorCode::MalformedMessage, e.to_string());
            return reply(tx, message).await;
        }
    };

    if message.room_id().is_empty() {
        return reply(
            tx,
            ServerMessage::error(ErrorCode::MalformedMessage, "roomId must not be empty"),
        )
        .await;
    }

    match message {
        ClientMessage::JoinRoom { room_id } => {
            if let Some(ref current) = conn.room {
                warn!(
                    peer = %conn.peer,
                    current = %current,
                    requested = %room_id,
                    "Join while already in a room"
                );
                return reply(
                    tx,
                    ServerMessage::error(
                        ErrorCode::AlreadyJoined,
                        format!("already joined room '{}'", current),
                    ),
                )
                .await;
            }

            match state.relay.join(&room_id, conn.peer).await? {
                Admission::Created | Admission::Joined { .. } => conn.room = Some(room_id),
                Admission::Full => {}
            }
        }

        ClientMessage::Message { room_id, payload } => {
            state.relay.relay(&room_id, conn.peer, payload).await?;
        }

        ClientMessage::Leave { room_id } => {
            if conn.room.as_deref() == Some(room_id.as_str()) {
                state.relay.leave(&room_id, conn.peer).await?;
                conn.room = None;
            } else {
                debug!(
                    peer = %conn.peer,
                    room_id = %room_id,
                    "Leave for a room not joined, ignoring"
                );
            }
        }

        ClientMessage::StatsReport {
            room_id,
            name,
            samples,
        } => match state.reports {
            Some(ref store) => {
                if let Err(e) = store.append(&room_id, &name, &samples).await {
                    error!(room_id = %room_id, name = %name, "Failed to store stats report: {}", e);
                    return reply(tx, ServerMessage::error(ErrorCode::ReportRejected, e.to_string()))
                        .await;
                }
            }
            None => {
                debug!(room_id = %room_id, "Stats persistence disabled, rejecting report");
                return reply(
                    tx,
                    ServerMessage::error(ErrorCode::ReportRejected, "stats persistence disabled"),
                )
                .await;
            }
        },
    }

    Ok(())
}

async fn reply(tx: &mpsc::Sender<String>, message: ServerMessage) -> Result<()> {
    let json = message.to_json()?;
    if tx.send(json).await.is_err() {
        debug!("Connection queue closed, reply dropped");
    }
    Ok(())
}
