//! WebSocket signaling client for room admission and peer message relay

use crate::{Error, Result};
use duet_core::protocol::{ClientMessage, PeerMessage, ServerMessage};
use duet_core::stats::StatsSnapshot;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound server messages buffered before the session drains them
const INBOUND_BUFFER: usize = 256;

/// How long [`SignalingClient::close`] waits for the close frame to flush
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket signaling client
///
/// Outgoing frames go through an unbounded queue drained by a sender task;
/// parsed server messages are delivered in arrival order on the receiver
/// returned by [`SignalingClient::connect`]. That receiver closes when the
/// server goes away.
pub struct SignalingClient {
    url: String,
    tx: mpsc::UnboundedSender<Message>,
    sender_done: watch::Receiver<bool>,
    receiver: JoinHandle<()>,
}

impl SignalingClient {
    /// Connect to the signaling server
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<ServerMessage>)> {
        info!("Connecting to signaling server: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect to {}: {}", url, e)))?;

        info!("Connected to signaling server");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

        let (done_tx, sender_done) = watch::channel(false);

        tokio::spawn(Self::sender_task(write, rx, done_tx));
        let receiver = tokio::spawn(Self::receiver_task(read, inbound_tx, tx.clone()));

        Ok((
            Self {
                url: url.to_string(),
                tx,
                sender_done,
                receiver,
            },
            inbound_rx,
        ))
    }

    /// Server URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue a message for the server
    pub fn send(&self, message: &ClientMessage) -> Result<()> {
        let text = message.to_json()?;
        debug!(room = message.room_id(), "Sending signaling message");
        self.tx
            .send(Message::Text(text))
            .map_err(|_| Error::SignalingError("signaling connection closed".to_string()))
    }

    /// Ask to join `room_id`
    pub fn join(&self, room_id: &str) -> Result<()> {
        self.send(&ClientMessage::JoinRoom {
            room_id: room_id.to_string(),
        })
    }

    /// Relay a peer message to the partner in `room_id`
    pub fn relay(&self, room_id: &str, message: &PeerMessage) -> Result<()> {
        self.send(&ClientMessage::relay(room_id, message)?)
    }

    /// Leave `room_id`
    pub fn leave(&self, room_id: &str) -> Result<()> {
        self.send(&ClientMessage::Leave {
            room_id: room_id.to_string(),
        })
    }

    /// Upload a stats log under `name`
    pub fn report_stats(
        &self,
        room_id: &str,
        name: &str,
        samples: Vec<StatsSnapshot>,
    ) -> Result<()> {
        self.send(&ClientMessage::StatsReport {
            room_id: room_id.to_string(),
            name: name.to_string(),
            samples,
        })
    }

    /// Send a close frame and stop the background tasks once it is flushed
    pub async fn close(&self) {
        if self.tx.send(Message::Close(None)).is_ok() {
            let mut done = self.sender_done.clone();
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, done.wait_for(|done| *done))
                .await
                .is_err()
            {
                warn!("Close frame not flushed in time");
            }
        }
        self.receiver.abort();
    }

    async fn sender_task(
        mut write: SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
        done_tx: watch::Sender<bool>,
    ) {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
            if closing {
                break;
            }
        }

        done_tx.send_replace(true);
        debug!("Sender task terminated");
    }

    async fn receiver_task(
        mut read: SplitStream<WsStream>,
        inbound_tx: mpsc::Sender<ServerMessage>,
        outbound_tx: mpsc::UnboundedSender<Message>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match ServerMessage::from_json(&text) {
                    Ok(message) => {
                        debug!(message = message.name(), "Received signaling message");
                        if inbound_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Ignoring malformed signaling message: {}", e);
                    }
                },
                Ok(Message::Ping(data)) => {
                    let _ = outbound_tx.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    info!("Signaling connection closed by server");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        debug!("Receiver task terminated");
    }
}
