//! Flow-controlled transfer channel over an `RTCDataChannel`

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use duet_core::transfer::ChunkChannel;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

/// Label prefix of per-transfer channels
pub const TRANSFER_CHANNEL_PREFIX: &str = "transfer-";

/// Label of the channel the initiator opens to start the first negotiation
pub const CONTROL_CHANNEL_LABEL: &str = "control";

/// Re-check interval while waiting for the buffered amount to drop
const LOW_WATER_POLL: Duration = Duration::from_millis(50);

/// Whether a remote channel carries a transfer
pub fn is_transfer_label(label: &str) -> bool {
    label.starts_with(TRANSFER_CHANNEL_PREFIX)
}

/// Data channel wrapper implementing [`ChunkChannel`]
///
/// The buffered-amount-low callback wakes waiters through a `Notify`; waiters
/// also re-read the buffered amount on a short interval since webrtc-rs only
/// signals a downward crossing of the threshold.
pub struct DataChannel {
    label: String,
    rtc_channel: Arc<RTCDataChannel>,
    low: Arc<Notify>,
    closed: Arc<AtomicBool>,
    open_rx: watch::Receiver<bool>,
    threshold: AtomicUsize,
}

impl DataChannel {
    /// Wrap a locally created channel and register its handlers
    pub async fn new(rtc_channel: Arc<RTCDataChannel>) -> Self {
        let label = rtc_channel.label().to_string();
        let low = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));
        let (open_tx, open_rx) = watch::channel(false);
        let open_tx = Arc::new(open_tx);

        let open_signal = Arc::clone(&open_tx);
        let open_label = label.clone();
        rtc_channel.on_open(Box::new(move || {
            debug!(label = %open_label, "Data channel opened");
            open_signal.send_replace(true);
            Box::pin(async {})
        }));

        let close_flag = Arc::clone(&closed);
        let close_notify = Arc::clone(&low);
        let close_label = label.clone();
        rtc_channel.on_close(Box::new(move || {
            debug!(label = %close_label, "Data channel closed");
            close_flag.store(true, Ordering::SeqCst);
            close_notify.notify_waiters();
            Box::pin(async {})
        }));

        let error_label = label.clone();
        rtc_channel.on_error(Box::new(move |e: webrtc::Error| {
            warn!(label = %error_label, "Data channel error: {}", e);
            Box::pin(async {})
        }));

        let low_notify = Arc::clone(&low);
        rtc_channel
            .on_buffered_amount_low(Box::new(move || {
                low_notify.notify_waiters();
                Box::pin(async {})
            }))
            .await;

        if rtc_channel.ready_state() == RTCDataChannelState::Open {
            open_tx.send_replace(true);
        }

        Self {
            label,
            rtc_channel,
            low,
            closed,
            open_rx,
            threshold: AtomicUsize::new(0),
        }
    }

    /// Channel label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the channel has closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for the channel to open
    pub async fn wait_open(&self, timeout: Duration) -> Result<()> {
        let mut open_rx = self.open_rx.clone();
        let result = match tokio::time::timeout(timeout, open_rx.wait_for(|open| *open)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::DataChannelError(format!(
                "{} dropped before opening",
                self.label
            ))),
            Err(_) => Err(Error::OperationTimeout(format!(
                "{} did not open within {:?}",
                self.label, timeout
            ))),
        };
        result
    }
}

#[async_trait]
impl ChunkChannel for DataChannel {
    async fn send(&self, chunk: Bytes) -> duet_core::Result<()> {
        if self.is_closed() {
            return Err(duet_core::Error::ChannelClosed(self.label.clone()));
        }
        self.rtc_channel
            .send(&chunk)
            .await
            .map(|_| ())
            .map_err(|e| duet_core::Error::SendFailed(format!("{}: {}", self.label, e)))
    }

    async fn buffered_amount(&self) -> usize {
        self.rtc_channel.buffered_amount().await
    }

    async fn set_buffered_amount_low_threshold(&self, threshold: usize) {
        self.threshold.store(threshold, Ordering::SeqCst);
        self.rtc_channel
            .set_buffered_amount_low_threshold(threshold)
            .await;
    }

    async fn wait_buffered_amount_low(&self) -> duet_core::Result<()> {
        loop {
            let notified = self.low.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return Err(duet_core::Error::ChannelClosed(format!(
                    "{} closed while draining",
                    self.label
                )));
            }

            if self.rtc_channel.buffered_amount().await <= self.threshold.load(Ordering::SeqCst) {
                return Ok(());
            }

            let _ = tokio::time::timeout(LOW_WATER_POLL, notified).await;
        }
    }

    async fn close(&self) -> duet_core::Result<()> {
        self.rtc_channel
            .close()
            .await
            .map_err(|e| duet_core::Error::TransportError(format!("{}: {}", self.label, e)))
    }
}
