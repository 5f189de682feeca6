use super::receiver::{ChunkOutcome, ChunkReceiver, PendingPayload};
use crate::protocol::TransferMetadata;
use crate::{Error, Result};
use bytes::Bytes;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a metadata announcement
#[derive(Debug)]
pub struct Announced {
    /// Set for a zero-size announcement, which completes immediately
    pub completed: Option<PendingPayload>,
    /// Unfinished transfer the announcement displaced, with bytes received
    pub replaced: Option<(TransferMetadata, u64)>,
}

/// [`ChunkReceiver`] that only accepts chunks from the channel carrying the
/// announced transfer
///
/// Each transfer travels on its own channel. The first channel that arrives
/// after an announcement is bound to it; chunks from any other channel are
/// discarded, and only a close of the bound channel aborts the transfer. A
/// channel is retired once its transfer ends, so late chunks from a cut-off
/// sender can't leak into the next transfer.
#[derive(Debug)]
pub struct BoundReceiver {
    receiver: ChunkReceiver,
    channel: Option<String>,
    retired: HashSet<String>,
}

impl BoundReceiver {
    /// Create a receiver publishing progress at most once per `progress_interval`
    pub fn new(progress_interval: Duration) -> Self {
        Self {
            receiver: ChunkReceiver::new(progress_interval),
            channel: None,
            retired: HashSet::new(),
        }
    }

    /// Whether a transfer is awaiting chunks
    pub fn is_receiving(&self) -> bool {
        self.receiver.is_receiving()
    }

    /// Label of the channel carrying the current transfer
    pub fn bound_channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Start a transfer, discarding any unfinished one and unbinding its channel
    pub fn announce(&mut self, metadata: TransferMetadata) -> Announced {
        let replaced = self.receiver.abort();
        if let Some(previous) = self.channel.take() {
            self.retired.insert(previous);
        }

        Announced {
            completed: self.receiver.begin(metadata),
            replaced,
        }
    }

    /// A transfer channel opened; bind it when a transfer is waiting for one
    pub fn attach(&mut self, label: &str) -> bool {
        if self.channel.is_some() || !self.receiver.is_receiving() || self.retired.contains(label)
        {
            debug!(label, "Transfer channel not bound");
            return false;
        }

        debug!(label, "Transfer channel bound");
        self.channel = Some(label.to_string());
        true
    }

    /// Feed a chunk that arrived on `label`
    ///
    /// Returns `Ok(None)` for chunks dropped silently: any chunk on a retired
    /// channel.
    ///
    /// # Errors
    ///
    /// - [`Error::StrayChunk`] for the first chunk from a channel that was
    ///   never bound; the channel is retired
    /// - Errors of [`ChunkReceiver::on_chunk`]; the bound channel is retired
    pub fn on_chunk(&mut self, label: &str, chunk: Bytes) -> Result<Option<ChunkOutcome>> {
        if self.channel.as_deref() != Some(label) {
            if self.retired.contains(label) {
                return Ok(None);
            }
            warn!(label, len = chunk.len(), "Chunk from unbound channel");
            self.retired.insert(label.to_string());
            return Err(Error::StrayChunk {
                channel: label.to_string(),
                len: chunk.len(),
            });
        }

        match self.receiver.on_chunk(chunk) {
            Ok(outcome) => {
                if outcome.completed.is_some() {
                    self.retire_bound();
                }
                Ok(Some(outcome))
            }
            Err(e) => {
                self.retire_bound();
                Err(e)
            }
        }
    }

    /// A transfer channel closed; aborts the transfer only if it was bound
    pub fn on_channel_closed(&mut self, label: &str) -> Option<(TransferMetadata, u64)> {
        if self.channel.as_deref() == Some(label) {
            self.retire_bound();
            self.receiver.abort()
        } else {
            self.retired.insert(label.to_string());
            None
        }
    }

    /// Drop the in-progress transfer, returning its metadata and received count
    pub fn abort(&mut self) -> Option<(TransferMetadata, u64)> {
        self.retire_bound();
        self.receiver.abort()
    }

    fn retire_bound(&mut self) {
        if let Some(label) = self.channel.take() {
            self.retired.insert(label);
        }
    }
}
