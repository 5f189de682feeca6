//! Shared in-memory transports for core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use duet_core::negotiation::{NegotiationTransport, SignalingState};
use duet_core::protocol::{IceCandidate, SdpKind, SessionDescription};
use duet_core::transfer::ChunkChannel;
use duet_core::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Transport that mimics the description state rules of a real peer connection
pub struct MemoryTransport {
    label: &'static str,
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
pub struct MemoryInner {
    pub state: Option<SignalingState>,
    pub offers: u32,
    pub local: Option<SessionDescription>,
    pub remote: Option<SessionDescription>,
    pub applied_remote: Vec<SessionDescription>,
    pub candidates: Vec<IceCandidate>,
    pub rollbacks: u32,
}

impl MemoryTransport {
    pub fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            inner: Mutex::new(MemoryInner::default()),
        })
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&MemoryInner) -> R) -> R {
        f(&self.inner.lock())
    }
}

#[async_trait]
impl NegotiationTransport for MemoryTransport {
    fn signaling_state(&self) -> SignalingState {
        self.inner.lock().state.unwrap_or(SignalingState::Stable)
    }

    async fn create_local_offer(&self, _ice_restart: bool) -> Result<SessionDescription> {
        let mut inner = self.inner.lock();
        if inner.state.unwrap_or(SignalingState::Stable) != SignalingState::Stable {
            return Err(Error::SdpError("offer outside stable".to_string()));
        }
        inner.offers += 1;
        let offer = SessionDescription::offer(format!("{}:offer:{}", self.label, inner.offers));
        inner.state = Some(SignalingState::HaveLocalOffer);
        inner.local = Some(offer.clone());
        Ok(offer)
    }

    async fn create_local_answer(&self) -> Result<SessionDescription> {
        let mut inner = self.inner.lock();
        let remote = match (&inner.remote, inner.state) {
            (Some(remote), Some(SignalingState::HaveRemoteOffer)) => remote.sdp.clone(),
            _ => return Err(Error::SdpError("no remote offer".to_string())),
        };
        let answer = SessionDescription::answer(format!("{}:answer:{}", self.label, remote));
        inner.state = Some(SignalingState::Stable);
        inner.local = Some(answer.clone());
        Ok(answer)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let mut inner = self.inner.lock();
        let state = inner.state.unwrap_or(SignalingState::Stable);
        let next = match (description.kind, state) {
            (SdpKind::Offer, SignalingState::Stable) => SignalingState::HaveRemoteOffer,
            (SdpKind::Answer, SignalingState::HaveLocalOffer) => SignalingState::Stable,
            (kind, state) => return Err(Error::SdpError(format!("{:?} in {:?}", kind, state))),
        };
        inner.state = Some(next);
        inner.remote = Some(description.clone());
        inner.applied_remote.push(description);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == Some(SignalingState::HaveLocalOffer) {
            inner.rollbacks += 1;
            inner.state = Some(SignalingState::Stable);
            inner.local = None;
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.remote.is_none() {
            return Err(Error::IceCandidateError("no remote description".to_string()));
        }
        inner.candidates.push(candidate);
        Ok(())
    }
}

/// Channel with a simulated send buffer that is drained externally
pub struct MockChannel {
    state: Mutex<MockState>,
    low: Notify,
}

#[derive(Default)]
pub struct MockState {
    pub buffered: usize,
    pub threshold: usize,
    pub max_buffered: usize,
    pub sent: Vec<Bytes>,
    pub closed: bool,
    pub fail_on_chunk: Option<usize>,
    pub low_signals: usize,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
            low: Notify::new(),
        })
    }

    pub fn failing_on(chunk_index: usize) -> Arc<Self> {
        let channel = Self::new();
        channel.state.lock().fail_on_chunk = Some(chunk_index);
        channel
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&MockState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Hand `bytes` of the buffer to the "network"
    pub fn drain(&self, bytes: usize) {
        let fire = {
            let mut state = self.state.lock();
            let before = state.buffered;
            state.buffered = before.saturating_sub(bytes);
            let fire = before > state.threshold && state.buffered <= state.threshold;
            if fire {
                state.low_signals += 1;
            }
            fire
        };
        if fire {
            self.low.notify_waiters();
        }
    }

    /// Drain `bytes` every `period` until aborted
    pub fn spawn_drain(self: &Arc<Self>, bytes: usize, period: Duration) -> JoinHandle<()> {
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                channel.drain(bytes);
            }
        })
    }
}

#[async_trait]
impl ChunkChannel for MockChannel {
    async fn send(&self, chunk: Bytes) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::ChannelClosed("mock channel closed".to_string()));
        }
        if state.fail_on_chunk == Some(state.sent.len()) {
            return Err(Error::TransportError("injected send failure".to_string()));
        }
        state.buffered += chunk.len();
        state.max_buffered = state.max_buffered.max(state.buffered);
        state.sent.push(chunk);
        Ok(())
    }

    async fn buffered_amount(&self) -> usize {
        self.state.lock().buffered
    }

    async fn set_buffered_amount_low_threshold(&self, threshold: usize) {
        self.state.lock().threshold = threshold;
    }

    async fn wait_buffered_amount_low(&self) -> Result<()> {
        loop {
            let notified = self.low.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock();
                if state.closed {
                    return Err(Error::ChannelClosed("mock channel closed".to_string()));
                }
                if state.buffered <= state.threshold {
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        self.low.notify_waiters();
        Ok(())
    }
}
