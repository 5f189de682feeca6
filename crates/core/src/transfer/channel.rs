use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Flow-controlled message channel a transfer is streamed over
///
/// Mirrors the data channel surface: a buffered-but-unsent byte counter and a
/// one-shot signal when that counter drops to a configurable threshold.
#[async_trait]
pub trait ChunkChannel: Send + Sync {
    /// Queue one message
    async fn send(&self, chunk: Bytes) -> Result<()>;

    /// Bytes queued but not yet handed to the network
    async fn buffered_amount(&self) -> usize;

    /// Threshold at which the buffered-amount-low signal fires
    async fn set_buffered_amount_low_threshold(&self, threshold: usize);

    /// Resolve once the buffered amount is at or below the threshold
    ///
    /// Returns immediately when it already is; fails if the channel closes
    /// while waiting.
    async fn wait_buffered_amount_low(&self) -> Result<()>;

    /// Close the channel
    async fn close(&self) -> Result<()>;
}
