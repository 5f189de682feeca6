//! Perfect negotiation state machine

use super::state::{ConnectionState, PoliteRole, SignalingState};
use super::transport::NegotiationTransport;
use crate::events::PeerEvent;
use crate::protocol::{IceCandidate, PeerMessage, SdpKind, SessionDescription};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

/// Default bound on ICE restarts before the session is torn down
pub const DEFAULT_MAX_ICE_RESTARTS: u32 = 3;

/// Mutable negotiation state, never held across an `.await`
#[derive(Debug, Default)]
struct NegotiationState {
    making_offer: bool,
    ignore_offer: bool,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
    connected_emitted: bool,
    ice_restarts: u32,
    closed: bool,
}

/// Per-pair negotiation session
///
/// All methods take `&self`; the negotiator is shared (`Arc<Negotiator>`)
/// between the transport callbacks and the signaling dispatch loop. Only one
/// description exchange step (create offer, apply remote description, create
/// answer, roll back) runs against the transport at a time.
pub struct Negotiator {
    transport: Arc<dyn NegotiationTransport>,
    role: PoliteRole,
    state: Mutex<NegotiationState>,
    exchange: AsyncMutex<()>,
    signaling_tx: mpsc::Sender<PeerMessage>,
    event_tx: Option<mpsc::Sender<PeerEvent>>,
    max_ice_restarts: u32,
}

impl Negotiator {
    /// Create a negotiator
    ///
    /// # Arguments
    ///
    /// * `transport` - Media stack the descriptions are applied to
    /// * `role` - Collision-resolution role from room admission
    /// * `signaling_tx` - Outbound path for descriptions and candidates
    pub fn new(
        transport: Arc<dyn NegotiationTransport>,
        role: PoliteRole,
        signaling_tx: mpsc::Sender<PeerMessage>,
    ) -> Self {
        Self {
            transport,
            role,
            state: Mutex::new(NegotiationState::default()),
            exchange: AsyncMutex::new(()),
            signaling_tx,
            event_tx: None,
            max_ice_restarts: DEFAULT_MAX_ICE_RESTARTS,
        }
    }

    /// Forward connectivity events to `event_tx`
    pub fn with_events(mut self, event_tx: mpsc::Sender<PeerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Bound the number of ICE restarts attempted after `failed`
    pub fn with_max_ice_restarts(mut self, max_ice_restarts: u32) -> Self {
        self.max_ice_restarts = max_ice_restarts;
        self
    }

    /// Local role
    pub fn role(&self) -> PoliteRole {
        self.role
    }

    /// Whether a local offer is being created
    pub fn is_making_offer(&self) -> bool {
        self.state.lock().making_offer
    }

    /// Whether remote offers (and their candidates) are currently ignored
    pub fn is_ignoring_offer(&self) -> bool {
        self.state.lock().ignore_offer
    }

    /// Candidates waiting for a remote description
    pub fn pending_candidate_count(&self) -> usize {
        self.state.lock().pending_candidates.len()
    }

    /// Whether `PeerConnected` has been emitted
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected_emitted
    }

    /// Whether the session was torn down
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Dispatch a negotiation message from the partner
    ///
    /// Returns `Ok(false)` for messages that are not part of negotiation.
    pub async fn handle_message(&self, message: PeerMessage) -> Result<bool> {
        match message {
            PeerMessage::Description(description) => {
                self.on_remote_description(description).await?;
                Ok(true)
            }
            PeerMessage::Candidate(candidate) => {
                self.on_remote_candidate(candidate).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Local negotiation trigger (a track or channel was added)
    ///
    /// Ignored unless the transport is `stable` and no offer is in flight; the
    /// transport raises the trigger again once it is back in `stable`.
    pub async fn on_negotiation_needed(&self) -> Result<()> {
        self.make_offer(false).await
    }

    async fn make_offer(&self, ice_restart: bool) -> Result<()> {
        let signaling_state = self.transport.signaling_state();
        if signaling_state != SignalingState::Stable {
            debug!(
                state = ?signaling_state,
                "Skipping offer, description exchange in progress"
            );
            return Ok(());
        }

        {
            let mut state = self.state.lock();
            if state.closed || state.making_offer {
                return Ok(());
            }
            state.making_offer = true;
        }

        let result = {
            let _exchange = self.exchange.lock().await;
            self.offer_locked(ice_restart).await
        };

        self.state.lock().making_offer = false;

        if let Err(ref e) = result {
            warn!("Local offer failed: {}", e);
        }
        result
    }

    async fn offer_locked(&self, ice_restart: bool) -> Result<()> {
        // A remote offer may have been applied while waiting for the exchange
        let signaling_state = self.transport.signaling_state();
        if signaling_state != SignalingState::Stable {
            debug!(state = ?signaling_state, "Dropping offer, left stable while waiting");
            return Ok(());
        }

        let offer = self.transport.create_local_offer(ice_restart).await?;
        debug!(role = ?self.role, ice_restart, "Sending local offer");
        self.send(PeerMessage::Description(offer)).await
    }

    /// Remote offer or answer
    pub async fn on_remote_description(&self, description: SessionDescription) -> Result<()> {
        match description.kind {
            SdpKind::Offer => self.on_remote_offer(description).await,
            SdpKind::Answer => self.on_remote_answer(description).await,
        }
    }

    async fn on_remote_offer(&self, offer: SessionDescription) -> Result<()> {
        let signaling_state = self.transport.signaling_state();

        {
            let mut state = self.state.lock();
            let collision = state.making_offer || signaling_state != SignalingState::Stable;
            state.ignore_offer = !self.role.is_polite() && collision;
            if state.ignore_offer {
                info!(
                    state = ?signaling_state,
                    "Offer collision, impolite side ignores remote offer"
                );
                return Ok(());
            }
        }

        let _exchange = self.exchange.lock().await;

        // A local offer in flight has landed by now
        let signaling_state = self.transport.signaling_state();
        if signaling_state != SignalingState::Stable {
            if !self.role.is_polite() {
                self.state.lock().ignore_offer = true;
                info!(
                    state = ?signaling_state,
                    "Offer collision, impolite side ignores remote offer"
                );
                return Ok(());
            }
            info!(
                state = ?signaling_state,
                "Offer collision, polite side rolls back local offer"
            );
            self.transport.rollback().await?;
        }

        self.apply_remote(offer).await?;

        let answer = self.transport.create_local_answer().await?;
        debug!("Sending local answer");
        self.send(PeerMessage::Description(answer)).await
    }

    async fn on_remote_answer(&self, answer: SessionDescription) -> Result<()> {
        let _exchange = self.exchange.lock().await;
        let signaling_state = self.transport.signaling_state();
        if signaling_state != SignalingState::HaveLocalOffer {
            warn!(state = ?signaling_state, "Dropping stale answer");
            return Ok(());
        }

        self.state.lock().ignore_offer = false;
        self.apply_remote(answer).await
    }

    async fn apply_remote(&self, description: SessionDescription) -> Result<()> {
        self.transport.set_remote_description(description).await?;

        let pending = {
            let mut state = self.state.lock();
            state.remote_description_set = true;
            std::mem::take(&mut state.pending_candidates)
        };

        if !pending.is_empty() {
            debug!(count = pending.len(), "Applying buffered candidates");
        }

        for candidate in pending {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!("Buffered candidate rejected: {}", e);
            }
        }

        Ok(())
    }

    /// Remote ICE candidate
    ///
    /// Discarded silently while a remote offer is being ignored, buffered until
    /// a remote description is applied, applied immediately otherwise.
    pub async fn on_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.ignore_offer {
                debug!("Discarding candidate for ignored offer");
                return Ok(());
            }
            if !state.remote_description_set {
                state.pending_candidates.push(candidate);
                return Ok(());
            }
        }

        match self.transport.add_ice_candidate(candidate).await {
            Ok(()) => Ok(()),
            Err(_) if self.is_ignoring_offer() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Transport connection state change
    pub async fn on_connection_state(&self, connection_state: ConnectionState) -> Result<()> {
        match connection_state {
            ConnectionState::Connected => {
                let first = {
                    let mut state = self.state.lock();
                    state.ice_restarts = 0;
                    let first = !state.connected_emitted && !state.closed;
                    state.connected_emitted = true;
                    first
                };
                if first {
                    info!(role = ?self.role, "Peer connected");
                    self.emit_event(PeerEvent::PeerConnected).await;
                }
                Ok(())
            }
            ConnectionState::Failed => {
                let attempt = {
                    let mut state = self.state.lock();
                    if state.closed {
                        return Ok(());
                    }
                    state.ice_restarts += 1;
                    state.ice_restarts
                };

                if attempt > self.max_ice_restarts {
                    warn!(
                        attempts = attempt - 1,
                        "ICE restarts exhausted, tearing session down"
                    );
                    self.teardown(Some("ICE failed".to_string())).await;
                    return Err(Error::TransportError(format!(
                        "ICE failed after {} restarts",
                        attempt - 1
                    )));
                }

                info!(attempt, max = self.max_ice_restarts, "Connection failed, restarting ICE");
                self.make_offer(true).await
            }
            ConnectionState::Disconnected | ConnectionState::Closed => {
                let reason = format!("connection {:?}", connection_state).to_lowercase();
                self.teardown(Some(reason)).await;
                Ok(())
            }
            ConnectionState::New | ConnectionState::Connecting => Ok(()),
        }
    }

    async fn teardown(&self, reason: Option<String>) {
        let first = {
            let mut state = self.state.lock();
            let first = !state.closed;
            state.closed = true;
            state.pending_candidates.clear();
            first
        };

        if first {
            info!(reason = ?reason, "Negotiation session torn down");
            self.emit_event(PeerEvent::peer_disconnected(reason)).await;
        }
    }

    async fn send(&self, message: PeerMessage) -> Result<()> {
        self.signaling_tx
            .send(message)
            .await
            .map_err(|_| Error::ChannelClosed("signaling path closed".to_string()))
    }

    async fn emit_event(&self, event: PeerEvent) {
        if let Some(ref tx) = self.event_tx {
            if let Err(e) = tx.send(event).await {
                warn!("Failed to emit peer event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    /// Single-sided transport that tracks the signaling state like a browser would
    #[derive(Default)]
    struct FakeTransport {
        inner: Mutex<FakeInner>,
    }

    struct FakeInner {
        state: SignalingState,
        offers: u32,
        remote: Option<SessionDescription>,
        candidates: Vec<IceCandidate>,
        rollbacks: u32,
        ice_restarts: u32,
    }

    impl Default for FakeInner {
        fn default() -> Self {
            Self {
                state: SignalingState::Stable,
                offers: 0,
                remote: None,
                candidates: Vec::new(),
                rollbacks: 0,
                ice_restarts: 0,
            }
        }
    }

    #[async_trait]
    impl NegotiationTransport for FakeTransport {
        fn signaling_state(&self) -> SignalingState {
            self.inner.lock().state
        }

        async fn create_local_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
            let mut inner = self.inner.lock();
            if inner.state != SignalingState::Stable {
                return Err(Error::SdpError("offer outside stable".to_string()));
            }
            inner.offers += 1;
            if ice_restart {
                inner.ice_restarts += 1;
            }
            inner.state = SignalingState::HaveLocalOffer;
            Ok(SessionDescription::offer(format!("local-offer-{}", inner.offers)))
        }

        async fn create_local_answer(&self) -> Result<SessionDescription> {
            let mut inner = self.inner.lock();
            if inner.state != SignalingState::HaveRemoteOffer {
                return Err(Error::SdpError("no remote offer".to_string()));
            }
            inner.state = SignalingState::Stable;
            Ok(SessionDescription::answer("local-answer"))
        }

        async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
            let mut inner = self.inner.lock();
            inner.state = match (description.kind, inner.state) {
                (SdpKind::Offer, SignalingState::Stable) => SignalingState::HaveRemoteOffer,
                (SdpKind::Answer, SignalingState::HaveLocalOffer) => SignalingState::Stable,
                (kind, state) => {
                    return Err(Error::SdpError(format!("{:?} in {:?}", kind, state)))
                }
            };
            inner.remote = Some(description);
            Ok(())
        }

        async fn rollback(&self) -> Result<()> {
            let mut inner = self.inner.lock();
            inner.rollbacks += 1;
            if inner.state == SignalingState::HaveLocalOffer {
                inner.state = SignalingState::Stable;
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

    /// Transport with slow offers that records overlapping exchange steps
    #[derive(Default)]
    struct SlowOfferTransport {
        fake: FakeTransport,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl SlowOfferTransport {
        fn enter(&self) -> InFlight<'_> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            InFlight(&self.in_flight)
        }
    }

    #[async_trait]
    impl NegotiationTransport for SlowOfferTransport {
        fn signaling_state(&self) -> SignalingState {
            self.fake.signaling_state()
        }

        async fn create_local_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
            let _step = self.enter();
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.fake.create_local_offer(ice_restart).await
        }

        async fn create_local_answer(&self) -> Result<SessionDescription> {
            let _step = self.enter();
            self.fake.create_local_answer().await
        }

        async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
            let _step = self.enter();
            self.fake.set_remote_description(description).await
        }

        async fn rollback(&self) -> Result<()> {
            let _step = self.enter();
            self.fake.rollback().await
        }

        async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
            self.fake.add_ice_candidate(candidate).await
        }
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{} 1 udp 1 10.0.0.1 {} typ host", n, 5000 + n),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        }
    }

    fn negotiator(
        role: PoliteRole,
    ) -> (
        Arc<FakeTransport>,
        Negotiator,
        mpsc::Receiver<PeerMessage>,
        mpsc::Receiver<PeerEvent>,
    ) {
        let transport = Arc::new(FakeTransport::default());
        let (signaling_tx, signaling_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let negotiator = Negotiator::new(transport.clone(), role, signaling_tx)
            .with_events(event_tx)
            .with_max_ice_restarts(2);
        (transport, negotiator, signaling_rx, event_rx)
    }

    #[tokio::test]
    async fn test_negotiation_needed_sends_offer() {
        let (transport, negotiator, mut signaling_rx, _events) = negotiator(PoliteRole::Impolite);

        negotiator.on_negotiation_needed().await.unwrap();

        let sent = signaling_rx.recv().await.unwrap();
        assert_eq!(
            sent,
            PeerMessage::Description(SessionDescription::offer("local-offer-1"))
        );
        assert_eq!(transport.signaling_state(), SignalingState::HaveLocalOffer);
        assert!(!negotiator.is_making_offer());
    }

    #[tokio::test]
    async fn test_negotiation_needed_ignored_outside_stable() {
        let (transport, negotiator, mut signaling_rx, _events) = negotiator(PoliteRole::Impolite);

        negotiator.on_negotiation_needed().await.unwrap();
        negotiator.on_negotiation_needed().await.unwrap();

        assert!(signaling_rx.recv().await.is_some());
        assert!(signaling_rx.try_recv().is_err());
        assert_eq!(transport.inner.lock().offers, 1);
    }

    #[tokio::test]
    async fn test_remote_offer_without_collision_is_answered() {
        let (transport, negotiator, mut signaling_rx, _events) = negotiator(PoliteRole::Impolite);

        negotiator
            .on_remote_description(SessionDescription::offer("remote-offer"))
            .await
            .unwrap();

        assert_eq!(
            signaling_rx.recv().await.unwrap(),
            PeerMessage::Description(SessionDescription::answer("local-answer"))
        );
        assert_eq!(transport.signaling_state(), SignalingState::Stable);
        assert!(!negotiator.is_ignoring_offer());
    }

    #[tokio::test]
    async fn test_impolite_ignores_colliding_offer() {
        let (transport, negotiator, mut signaling_rx, _events) = negotiator(PoliteRole::Impolite);

        negotiator.on_negotiation_needed().await.unwrap();
        let _own_offer = signaling_rx.recv().await.unwrap();

        negotiator
            .on_remote_description(SessionDescription::offer("remote-offer"))
            .await
            .unwrap();

        assert!(negotiator.is_ignoring_offer());
        assert!(signaling_rx.try_recv().is_err());
        assert_eq!(transport.signaling_state(), SignalingState::HaveLocalOffer);
        assert!(transport.inner.lock().remote.is_none());
        assert_eq!(transport.inner.lock().rollbacks, 0);
    }

    #[tokio::test]
    async fn test_candidates_discarded_while_ignoring_offer() {
        let (transport, negotiator, mut signaling_rx, _events) = negotiator(PoliteRole::Impolite);

        negotiator.on_negotiation_needed().await.unwrap();
        let _ = signaling_rx.recv().await;
        negotiator
            .on_remote_description(SessionDescription::offer("remote-offer"))
            .await
            .unwrap();

        negotiator.on_remote_candidate(candidate(1)).await.unwrap();
        negotiator.on_remote_candidate(candidate(2)).await.unwrap();

        assert_eq!(negotiator.pending_candidate_count(), 0);
        assert!(transport.inner.lock().candidates.is_empty());
    }

    #[tokio::test]
    async fn test_answer_clears_ignore_offer() {
        let (_transport, negotiator, mut signaling_rx, _events) = negotiator(PoliteRole::Impolite);

        negotiator.on_negotiation_needed().await.unwrap();
        let _ = signaling_rx.recv().await;
        negotiator
            .on_remote_description(SessionDescription::offer("remote-offer"))
            .await
            .unwrap();
        assert!(negotiator.is_ignoring_offer());

        negotiator
            .on_remote_description(SessionDescription::answer("remote-answer"))
            .await
            .unwrap();
        assert!(!negotiator.is_ignoring_offer());

        negotiator.on_remote_candidate(candidate(7)).await.unwrap();
        assert_eq!(negotiator.pending_candidate_count(), 0);
    }

    #[tokio::test]
    async fn test_polite_rolls_back_and_answers() {
        let (transport, negotiator, mut signaling_rx, _events) = negotiator(PoliteRole::Polite);

        negotiator.on_negotiation_needed().await.unwrap();
        let _own_offer = signaling_rx.recv().await.unwrap();

        negotiator
            .on_remote_description(SessionDescription::offer("remote-offer"))
            .await
            .unwrap();

        assert_eq!(transport.inner.lock().rollbacks, 1);
        assert_eq!(
            signaling_rx.recv().await.unwrap(),
            PeerMessage::Description(SessionDescription::answer("local-answer"))
        );
        assert_eq!(
            transport.inner.lock().remote,
            Some(SessionDescription::offer("remote-offer"))
        );
        assert_eq!(transport.signaling_state(), SignalingState::Stable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_offer_waits_for_local_offer_in_flight() {
        let transport = Arc::new(SlowOfferTransport::default());
        let (signaling_tx, mut signaling_rx) = mpsc::channel(16);
        let negotiator = Arc::new(Negotiator::new(
            transport.clone(),
            PoliteRole::Polite,
            signaling_tx,
        ));

        let offering = tokio::spawn({
            let negotiator = negotiator.clone();
            async move { negotiator.on_negotiation_needed().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(negotiator.is_making_offer());

        assert_ok!(
            negotiator
                .on_remote_description(SessionDescription::offer("remote-offer"))
                .await
        );
        assert_ok!(offering.await.unwrap());

        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            signaling_rx.recv().await.unwrap(),
            PeerMessage::Description(SessionDescription::offer("local-offer-1"))
        );
        assert_eq!(
            signaling_rx.recv().await.unwrap(),
            PeerMessage::Description(SessionDescription::answer("local-answer"))
        );
        assert_eq!(transport.fake.inner.lock().rollbacks, 1);
        assert_eq!(transport.signaling_state(), SignalingState::Stable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_impolite_ignores_offer_that_raced_its_own() {
        let transport = Arc::new(SlowOfferTransport::default());
        let (signaling_tx, mut signaling_rx) = mpsc::channel(16);
        let negotiator = Arc::new(Negotiator::new(
            transport.clone(),
            PoliteRole::Impolite,
            signaling_tx,
        ));

        let offering = tokio::spawn({
            let negotiator = negotiator.clone();
            async move { negotiator.on_negotiation_needed().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_ok!(
            negotiator
                .on_remote_description(SessionDescription::offer("remote-offer"))
                .await
        );
        assert_ok!(offering.await.unwrap());

        assert!(negotiator.is_ignoring_offer());
        assert_eq!(
            signaling_rx.recv().await.unwrap(),
            PeerMessage::Description(SessionDescription::offer("local-offer-1"))
        );
        assert!(signaling_rx.try_recv().is_err());
        assert_eq!(transport.signaling_state(), SignalingState::HaveLocalOffer);
    }

    #[tokio::test]
    async fn test_stale_answer_dropped() {
        let (transport, negotiator, _signaling_rx, _events) = negotiator(PoliteRole::Polite);

        negotiator
            .on_remote_description(SessionDescription::answer("late"))
            .await
            .unwrap();

        assert!(transport.inner.lock().remote.is_none());
        assert_eq!(transport.signaling_state(), SignalingState::Stable);
    }

    #[tokio::test]
    async fn test_early_candidates_buffered_in_order() {
        let (transport, negotiator, _signaling_rx, _events) = negotiator(PoliteRole::Polite);

        negotiator.on_remote_candidate(candidate(1)).await.unwrap();
        negotiator.on_remote_candidate(candidate(2)).await.unwrap();
        assert_eq!(negotiator.pending_candidate_count(), 2);
        assert!(transport.inner.lock().candidates.is_empty());

        negotiator
            .on_remote_description(SessionDescription::offer("remote-offer"))
            .await
            .unwrap();

        assert_eq!(negotiator.pending_candidate_count(), 0);
        assert_eq!(
            transport.inner.lock().candidates,
            vec![candidate(1), candidate(2)]
        );

        negotiator.on_remote_candidate(candidate(3)).await.unwrap();
        assert_eq!(transport.inner.lock().candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_connected_emitted_once() {
        let (_transport, negotiator, _signaling_rx, mut events) = negotiator(PoliteRole::Polite);

        negotiator
            .on_connection_state(ConnectionState::Connecting)
            .await
            .unwrap();
        negotiator
            .on_connection_state(ConnectionState::Connected)
            .await
            .unwrap();
        negotiator
            .on_connection_state(ConnectionState::Connected)
            .await
            .unwrap();

        assert!(matches!(events.recv().await, Some(PeerEvent::PeerConnected)));
        assert!(events.try_recv().is_err());
        assert!(negotiator.is_connected());
    }

    #[tokio::test]
    async fn test_failed_triggers_bounded_ice_restart() {
        let (transport, negotiator, mut signaling_rx, mut events) =
            negotiator(PoliteRole::Impolite);

        negotiator
            .on_connection_state(ConnectionState::Failed)
            .await
            .unwrap();
        assert!(matches!(
            signaling_rx.recv().await,
            Some(PeerMessage::Description(_))
        ));
        assert_eq!(transport.inner.lock().ice_restarts, 1);

        // Complete the restart exchange so the next restart starts from stable
        negotiator
            .on_remote_description(SessionDescription::answer("restart-answer"))
            .await
            .unwrap();
        negotiator
            .on_connection_state(ConnectionState::Failed)
            .await
            .unwrap();
        assert_eq!(transport.inner.lock().ice_restarts, 2);

        let err = negotiator
            .on_connection_state(ConnectionState::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransportError(_)));
        assert!(negotiator.is_closed());
        assert!(matches!(
            events.recv().await,
            Some(PeerEvent::PeerDisconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_tears_down_once() {
        let (_transport, negotiator, _signaling_rx, mut events) = negotiator(PoliteRole::Polite);

        negotiator
            .on_connection_state(ConnectionState::Disconnected)
            .await
            .unwrap();
        negotiator
            .on_connection_state(ConnectionState::Closed)
            .await
            .unwrap();

        match events.recv().await {
            Some(PeerEvent::PeerDisconnected { reason }) => {
                assert_eq!(reason.as_deref(), Some("connection disconnected"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(events.try_recv().is_err());

        // A closed session makes no further offers
        negotiator.on_negotiation_needed().await.unwrap();
        assert!(negotiator.is_closed());
    }

    #[tokio::test]
    async fn test_handle_message_routes_negotiation_only() {
        let (_transport, negotiator, _signaling_rx, _events) = negotiator(PoliteRole::Polite);

        assert!(negotiator
            .handle_message(PeerMessage::Candidate(candidate(1)))
            .await
            .unwrap());
        assert!(!negotiator.handle_message(PeerMessage::Ready).await.unwrap());
    }
}
