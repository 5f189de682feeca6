use super::channel::ChunkChannel;
use super::progress::ProgressThrottle;
use crate::config::TransferConfig;
use crate::events::{PeerEvent, TransferDirection, TransferProgress};
use crate::protocol::{PeerMessage, TransferMetadata};
use crate::{Error, Result};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Summary of a finished send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Payload name
    pub name: String,
    /// Bytes queued on the channel
    pub bytes_sent: u64,
    /// Chunks queued on the channel
    pub chunks: usize,
    /// Times the sender paused for the low-water signal
    pub pauses: usize,
    /// Whether the max-duration cutoff stopped the send early
    pub truncated: bool,
    /// Wall time spent streaming
    pub elapsed: Duration,
}

/// Send side of the transfer engine
pub struct ChunkSender {
    config: TransferConfig,
    event_tx: Option<mpsc::Sender<PeerEvent>>,
}

enum Backpressure {
    Resumed,
    Expired,
}

impl ChunkSender {
    /// Create a sender
    ///
    /// # Errors
    ///
    /// Returns an error if the watermark configuration is invalid.
    pub fn new(config: TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            event_tx: None,
        })
    }

    /// Publish progress to `event_tx`
    pub fn with_events(mut self, event_tx: mpsc::Sender<PeerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Transfer configuration
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Announce, open the channel, stream, then drain and close
    ///
    /// The metadata message is queued on `signaling_tx` before `open_channel`
    /// runs, so the receiver learns the size and name before any chunk.
    pub async fn send<C, F, Fut>(
        &self,
        name: &str,
        payload: Bytes,
        signaling_tx: &mpsc::Sender<PeerMessage>,
        open_channel: F,
    ) -> Result<SendReport>
    where
        C: ChunkChannel + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<C>>>,
    {
        self.announce(signaling_tx, name, payload.len() as u64)
            .await?;

        let channel = open_channel().await?;
        let report = self.stream(channel.as_ref(), name, payload).await?;

        if !report.truncated {
            self.drain(channel.as_ref()).await?;
            channel.close().await?;
        }

        Ok(report)
    }

    /// Queue the metadata announcement on the signaling path
    pub async fn announce(
        &self,
        signaling_tx: &mpsc::Sender<PeerMessage>,
        name: &str,
        size: u64,
    ) -> Result<()> {
        debug!(name, size, "Announcing transfer");
        signaling_tx
            .send(PeerMessage::Metadata(TransferMetadata {
                size,
                name: name.to_string(),
            }))
            .await
            .map_err(|_| Error::ChannelClosed("signaling path closed".to_string()))
    }

    /// Stream `payload` as chunks, pausing on the high-water mark
    ///
    /// A chunk is queued only when `buffered + chunk_len <= high_water_mark`;
    /// otherwise the sender waits for the low-water signal. A send error aborts
    /// the remaining transfer without retrying the chunk.
    pub async fn stream<C>(&self, channel: &C, name: &str, payload: Bytes) -> Result<SendReport>
    where
        C: ChunkChannel + ?Sized,
    {
        let total = payload.len();
        let started = Instant::now();
        let deadline = self.config.max_duration().map(|d| started + d);
        let mut throttle = ProgressThrottle::new(self.config.progress_interval());

        channel
            .set_buffered_amount_low_threshold(self.config.low_water_mark)
            .await;

        info!(
            name,
            size = total,
            chunk_size = self.config.chunk_size,
            high_water = self.config.high_water_mark,
            low_water = self.config.low_water_mark,
            "Starting transfer"
        );

        let mut offset = 0usize;
        let mut chunks = 0usize;
        let mut pauses = 0usize;
        let mut truncated = false;

        while offset < total {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                truncated = true;
                break;
            }

            let end = (offset + self.config.chunk_size).min(total);
            let chunk = payload.slice(offset..end);

            let buffered = channel.buffered_amount().await;
            if buffered + chunk.len() > self.config.high_water_mark {
                pauses += 1;
                debug!(buffered, offset, "High-water mark reached, pausing");
                match self.wait_low(channel, deadline).await? {
                    Backpressure::Resumed => {}
                    Backpressure::Expired => {
                        truncated = true;
                        break;
                    }
                }
            }

            if let Err(e) = channel.send(chunk).await {
                warn!(name, offset, "Chunk send failed, aborting transfer: {}", e);
                self.emit_final(name, offset as u64, total as u64).await;
                return Err(Error::SendFailed(e.to_string()));
            }

            offset = end;
            chunks += 1;

            if offset < total && throttle.ready() {
                self.emit_progress(name, offset as u64, total as u64);
            }
        }

        self.emit_final(name, offset as u64, total as u64).await;

        if truncated {
            info!(
                name,
                sent = offset,
                size = total,
                "Max duration reached, closing channel"
            );
            if let Err(e) = channel.close().await {
                warn!("Failed to close channel after cutoff: {}", e);
            }
        }

        let elapsed = started.elapsed();
        info!(
            name,
            bytes = offset,
            chunks,
            pauses,
            elapsed_ms = elapsed.as_millis() as u64,
            "Transfer streamed"
        );

        Ok(SendReport {
            name: name.to_string(),
            bytes_sent: offset as u64,
            chunks,
            pauses,
            truncated,
            elapsed,
        })
    }

    /// Wait until every queued byte has left the channel's buffer
    pub async fn drain<C>(&self, channel: &C) -> Result<()>
    where
        C: ChunkChannel + ?Sized,
    {
        channel.set_buffered_amount_low_threshold(0).await;
        channel.wait_buffered_amount_low().await
    }

    async fn wait_low<C>(&self, channel: &C, deadline: Option<Instant>) -> Result<Backpressure>
    where
        C: ChunkChannel + ?Sized,
    {
        match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, channel.wait_buffered_amount_low()).await
                {
                    Ok(result) => result.map(|_| Backpressure::Resumed),
                    Err(_) => Ok(Backpressure::Expired),
                }
            }
            None => channel
                .wait_buffered_amount_low()
                .await
                .map(|_| Backpressure::Resumed),
        }
    }

    fn emit_progress(&self, name: &str, transferred: u64, total: u64) {
        if let Some(ref tx) = self.event_tx {
            let event = PeerEvent::TransferProgress(Self::snapshot(name, transferred, total));
            if tx.try_send(event).is_err() {
                debug!("Progress update dropped, event channel full");
            }
        }
    }

    async fn emit_final(&self, name: &str, transferred: u64, total: u64) {
        if let Some(ref tx) = self.event_tx {
            let event = PeerEvent::TransferProgress(Self::snapshot(name, transferred, total));
            if let Err(e) = tx.send(event).await {
                warn!("Failed to emit transfer progress: {}", e);
            }
        }
    }

    fn snapshot(name: &str, transferred: u64, total: u64) -> TransferProgress {
        TransferProgress {
            direction: TransferDirection::Outbound,
            name: name.to_string(),
            transferred,
            total,
        }
    }
}
