use super::progress::ProgressThrottle;
use crate::events::{TransferDirection, TransferProgress};
use crate::protocol::TransferMetadata;
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Inbound transfer state between announcement and completion
#[derive(Debug)]
struct InboundTransfer {
    metadata: TransferMetadata,
    received: u64,
    chunks: Vec<Bytes>,
}

/// Result of feeding one chunk to the receiver
#[derive(Debug)]
pub struct ChunkOutcome {
    /// Progress update to publish, if one is due
    pub progress: Option<TransferProgress>,
    /// Set when this chunk completed the transfer
    pub completed: Option<PendingPayload>,
}

/// All chunks of a completed transfer, not yet concatenated
#[derive(Debug)]
pub struct PendingPayload {
    /// Name from the metadata announcement
    pub name: String,
    /// Announced size
    pub size: u64,
    chunks: Vec<Bytes>,
}

/// Reassembled payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPayload {
    /// Name from the metadata announcement
    pub name: String,
    /// Payload bytes
    pub data: Bytes,
}

impl PendingPayload {
    /// Concatenate the chunks
    pub fn assemble(self) -> ReceivedPayload {
        let data = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.size as usize);
                for chunk in &self.chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        };

        ReceivedPayload {
            name: self.name,
            data,
        }
    }

    /// Concatenate on the blocking pool so large payloads don't stall event dispatch
    pub async fn assemble_offloaded(self) -> Result<ReceivedPayload> {
        tokio::task::spawn_blocking(move || self.assemble())
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("reassembly task failed: {}", e)))
    }
}

/// Receive side of the transfer engine
///
/// Holds at most one inbound transfer. Chunks are assumed to arrive in send
/// order (reliable, ordered channel).
#[derive(Debug)]
pub struct ChunkReceiver {
    current: Option<InboundTransfer>,
    throttle: ProgressThrottle,
}

impl ChunkReceiver {
    /// Create a receiver publishing progress at most once per `progress_interval`
    pub fn new(progress_interval: Duration) -> Self {
        Self {
            current: None,
            throttle: ProgressThrottle::new(progress_interval),
        }
    }

    /// Whether a transfer is awaiting chunks
    pub fn is_receiving(&self) -> bool {
        self.current.is_some()
    }

    /// Announced metadata and bytes received so far
    pub fn progress(&self) -> Option<(&TransferMetadata, u64)> {
        self.current
            .as_ref()
            .map(|transfer| (&transfer.metadata, transfer.received))
    }

    /// Start a transfer from its metadata announcement
    ///
    /// A zero-size announcement completes immediately. An announcement that
    /// arrives mid-transfer discards the unfinished one (the sender restarted).
    pub fn begin(&mut self, metadata: TransferMetadata) -> Option<PendingPayload> {
        if let Some(previous) = self.current.take() {
            warn!(
                name = %previous.metadata.name,
                received = previous.received,
                size = previous.metadata.size,
                "New announcement replaces unfinished transfer"
            );
        }

        info!(name = %metadata.name, size = metadata.size, "Receiving transfer");

        if metadata.size == 0 {
            return Some(PendingPayload {
                name: metadata.name,
                size: 0,
                chunks: Vec::new(),
            });
        }

        let expected_chunks = 16.min(metadata.size as usize);
        self.current = Some(InboundTransfer {
            metadata,
            received: 0,
            chunks: Vec::with_capacity(expected_chunks),
        });
        None
    }

    /// Append a chunk
    ///
    /// # Errors
    ///
    /// - [`Error::UnannouncedChunk`] when no transfer was announced
    /// - [`Error::SizeOverflow`] when the chunk exceeds the announced size; the
    ///   partial buffer is discarded
    pub fn on_chunk(&mut self, chunk: Bytes) -> Result<ChunkOutcome> {
        let transfer = self
            .current
            .as_mut()
            .ok_or(Error::UnannouncedChunk(chunk.len()))?;

        let received = transfer.received + chunk.len() as u64;
        if received > transfer.metadata.size {
            let announced = transfer.metadata.size;
            warn!(
                name = %transfer.metadata.name,
                announced,
                received,
                "Transfer overflowed its announcement, discarding"
            );
            self.current = None;
            return Err(Error::SizeOverflow {
                announced,
                received,
            });
        }

        transfer.received = received;
        transfer.chunks.push(chunk);

        if received == transfer.metadata.size {
            let progress = Some(Self::snapshot(transfer));
            let transfer = self.current.take();
            let completed = transfer.map(|t| {
                debug!(name = %t.metadata.name, chunks = t.chunks.len(), "Transfer complete");
                PendingPayload {
                    name: t.metadata.name,
                    size: t.metadata.size,
                    chunks: t.chunks,
                }
            });
            return Ok(ChunkOutcome {
                progress,
                completed,
            });
        }

        let progress = if self.throttle.ready() {
            Some(Self::snapshot(transfer))
        } else {
            None
        };

        Ok(ChunkOutcome {
            progress,
            completed: None,
        })
    }

    /// Drop the in-progress transfer, returning its metadata and received count
    pub fn abort(&mut self) -> Option<(TransferMetadata, u64)> {
        self.current
            .take()
            .map(|transfer| (transfer.metadata, transfer.received))
    }

    fn snapshot(transfer: &InboundTransfer) -> TransferProgress {
        TransferProgress {
            direction: TransferDirection::Inbound,
            name: transfer.metadata.name.clone(),
            transferred: transfer.received,
            total: transfer.metadata.size,
        }
    }
}
