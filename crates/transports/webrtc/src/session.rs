//! Peer session
//!
//! One [`PeerSession`] per room membership. It owns the signaling client and,
//! while a partner is present, a *link*: the peer connection with its
//! negotiator, inbound transfer state, remote media router and stats sampler.
//! A link is opened on `join`/`joined` and torn down on `left`, on connection
//! loss, or when the session closes; the session itself stays in the room and
//! opens a fresh link for the next arrival.

use crate::channels::{
    is_transfer_label, DataChannel, CONTROL_CHANNEL_LABEL, TRANSFER_CHANNEL_PREFIX,
};
use crate::config::PeerConfig;
use crate::media::{self, RemoteTracks};
use crate::peer::{candidate_from_init, map_connection_state, PeerConnection};
use crate::signaling::SignalingClient;
use crate::stats::PeerStatsSource;
use crate::{Error, Result};
use bytes::Bytes;
use duet_core::events::{PeerEvent, TransferDirection};
use duet_core::negotiation::{ConnectionState, NegotiationTransport, Negotiator, PoliteRole};
use duet_core::protocol::{ContentKind, PeerMessage, ServerMessage};
use duet_core::stats::{StatsSampler, StatsSnapshot};
use duet_core::transfer::{Announced, BoundReceiver, ChunkOutcome, ChunkSender, SendReport};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Outbound peer messages queued ahead of the signaling client
const PEER_MESSAGE_BUFFER: usize = 256;

/// Local transport events for one link, handled in arrival order
enum LinkSignal {
    NegotiationNeeded,
    ConnectionState(ConnectionState),
}

/// Per-partner state
struct Link {
    peer: Arc<PeerConnection>,
    negotiator: Arc<Negotiator>,
    inbound: Mutex<BoundReceiver>,
    media: Mutex<RemoteTracks<Arc<TrackRemote>>>,
    ready: Mutex<Option<oneshot::Sender<()>>>,
    sampler: Mutex<Option<StatsSampler>>,
}

impl Link {
    async fn on_chunk(&self, label: &str, data: Bytes, events: &mpsc::Sender<PeerEvent>) {
        let outcome = self.inbound.lock().on_chunk(label, data);

        match outcome {
            Ok(Some(ChunkOutcome {
                progress,
                completed,
            })) => {
                if let Some(progress) = progress {
                    let event = PeerEvent::TransferProgress(progress);
                    if completed.is_some() {
                        emit(events, event).await;
                    } else if events.try_send(event).is_err() {
                        debug!("Progress update dropped, event channel full");
                    }
                }

                if let Some(pending) = completed {
                    match pending.assemble_offloaded().await {
                        Ok(payload) => {
                            info!(
                                name = %payload.name,
                                bytes = payload.data.len(),
                                "Payload received"
                            );
                            emit(
                                events,
                                PeerEvent::PayloadReceived {
                                    name: payload.name,
                                    data: payload.data,
                                },
                            )
                            .await;
                        }
                        Err(e) => {
                            let event = PeerEvent::transfer_failed(
                                TransferDirection::Inbound,
                                e.to_string(),
                            );
                            emit(events, event).await;
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(label, "Inbound chunk rejected: {}", e);
                let event = PeerEvent::transfer_failed(TransferDirection::Inbound, e.to_string());
                emit(events, event).await;
            }
        }
    }

    async fn on_transfer_channel_closed(&self, label: &str, events: &mpsc::Sender<PeerEvent>) {
        let aborted = self.inbound.lock().on_channel_closed(label);

        if let Some((metadata, received)) = aborted {
            warn!(
                name = %metadata.name,
                received,
                size = metadata.size,
                "Transfer channel closed before completion"
            );
            emit(
                events,
                PeerEvent::transfer_failed(
                    TransferDirection::Inbound,
                    format!(
                        "{} truncated: received {} of {} bytes",
                        metadata.name, received, metadata.size
                    ),
                ),
            )
            .await;
        }
    }
}

struct SessionShared {
    config: PeerConfig,
    signaling: SignalingClient,
    peer_tx: mpsc::Sender<PeerMessage>,
    event_tx: mpsc::Sender<PeerEvent>,
    sender: ChunkSender,
    role: Mutex<Option<PoliteRole>>,
    link: Mutex<Option<Arc<Link>>>,
    stats_log: Mutex<Vec<StatsSnapshot>>,
    transfer_lock: tokio::sync::Mutex<()>,
}

impl SessionShared {
    fn current_link(&self) -> Option<Arc<Link>> {
        self.link.lock().clone()
    }

    async fn emit(&self, event: PeerEvent) {
        emit(&self.event_tx, event).await;
    }

    async fn handle_server_message(self: &Arc<Self>, message: ServerMessage) -> Result<()> {
        if let Some(role) = PoliteRole::from_admission(&message) {
            *self.role.lock() = Some(role);
        }

        match message {
            ServerMessage::Created { room_id } => {
                info!(room = %room_id, "Created room, waiting for a partner");
                self.emit(PeerEvent::RoomCreated { room_id }).await;
            }
            ServerMessage::Joined { room_id } => {
                info!(room = %room_id, "Joined room");
                self.emit(PeerEvent::RoomJoined { room_id }).await;
                self.open_link(PoliteRole::Polite).await?;
            }
            ServerMessage::Join { room_id } => {
                info!(room = %room_id, "Partner joined");
                self.emit(PeerEvent::PeerJoined { room_id }).await;
                self.open_link(PoliteRole::Impolite).await?;
            }
            ServerMessage::Full => {
                warn!(room = %self.config.room_id, "Room is full");
                self.emit(PeerEvent::RoomFull).await;
            }
            ServerMessage::Left { room_id } => {
                info!(room = %room_id, "Partner left");
                self.teardown_link("partner left").await;
                self.emit(PeerEvent::PeerLeft { room_id }).await;
            }
            ServerMessage::Message { payload } => {
                let message = PeerMessage::from_payload(payload)?;
                self.handle_peer_message(message).await?;
            }
            ServerMessage::Error { code, message } => {
                warn!(?code, "Signaling server error: {}", message);
                self.emit(PeerEvent::error(format!("{:?}: {}", code, message)))
                    .await;
            }
        }

        Ok(())
    }

    async fn handle_peer_message(&self, message: PeerMessage) -> Result<()> {
        let Some(link) = self.current_link() else {
            warn!(message = message.name(), "Peer message without a partner, dropping");
            return Ok(());
        };

        match message {
            PeerMessage::Description(_) | PeerMessage::Candidate(_) => {
                link.negotiator.handle_message(message).await?;
            }
            PeerMessage::Ready => match link.ready.lock().take() {
                Some(ready_tx) => {
                    let _ = ready_tx.send(());
                }
                None => debug!("Ready without a pending transfer"),
            },
            PeerMessage::Metadata(metadata) => {
                let Announced {
                    completed,
                    replaced,
                } = link.inbound.lock().announce(metadata);

                if let Some((previous, received)) = replaced {
                    self.emit(PeerEvent::transfer_failed(
                        TransferDirection::Inbound,
                        format!(
                            "{} replaced by a new announcement: received {} of {} bytes",
                            previous.name, received, previous.size
                        ),
                    ))
                    .await;
                }

                if let Some(pending) = completed {
                    let payload = pending.assemble();
                    info!(name = %payload.name, "Empty payload received");
                    self.emit(PeerEvent::PayloadReceived {
                        name: payload.name,
                        data: payload.data,
                    })
                    .await;
                }

                self.peer_tx
                    .send(PeerMessage::Ready)
                    .await
                    .map_err(|_| Error::SignalingError("signaling path closed".to_string()))?;
            }
            PeerMessage::ContentTag { stream_id, tag } => {
                let released = link.media.lock().on_tag(&stream_id, tag);
                for (stream_id, kind) in released {
                    self.emit(PeerEvent::RemoteStream { stream_id, kind }).await;
                }
            }
        }

        Ok(())
    }

    #[instrument(skip(self), fields(room = %self.config.room_id))]
    async fn open_link(self: &Arc<Self>, role: PoliteRole) -> Result<()> {
        self.teardown_link("replaced by a new partner").await;

        let peer = Arc::new(PeerConnection::new(&self.config).await?);
        let transport: Arc<dyn NegotiationTransport> = peer.clone();
        let negotiator = Arc::new(
            Negotiator::new(transport, role, self.peer_tx.clone())
                .with_events(self.event_tx.clone())
                .with_max_ice_restarts(self.config.max_ice_restarts),
        );

        let link = Arc::new(Link {
            peer,
            negotiator,
            inbound: Mutex::new(BoundReceiver::new(self.config.transfer.progress_interval())),
            media: Mutex::new(RemoteTracks::new()),
            ready: Mutex::new(None),
            sampler: Mutex::new(None),
        });

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        self.wire_callbacks(&link, signal_tx);
        tokio::spawn(run_link_signals(
            Arc::downgrade(self),
            Arc::downgrade(&link),
            signal_rx,
        ));

        *self.link.lock() = Some(Arc::clone(&link));
        info!(?role, "Peer link opened");

        if !role.is_polite() {
            link.peer.create_data_channel(CONTROL_CHANNEL_LABEL).await?;
        }

        Ok(())
    }

    fn wire_callbacks(
        self: &Arc<Self>,
        link: &Arc<Link>,
        signal_tx: mpsc::UnboundedSender<LinkSignal>,
    ) {
        let rtc = link.peer.rtc();

        let peer_tx = self.peer_tx.clone();
        rtc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let peer_tx = peer_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let message = PeerMessage::Candidate(candidate_from_init(init));
                        if peer_tx.send(message).await.is_err() {
                            debug!("Signaling path closed, dropping local candidate");
                        }
                    }
                    Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
                }
            })
        }));

        let negotiation_tx = signal_tx.clone();
        rtc.on_negotiation_needed(Box::new(move || {
            let _ = negotiation_tx.send(LinkSignal::NegotiationNeeded);
            Box::pin(async {})
        }));

        rtc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(%state, "Peer connection state changed");
            if let Some(state) = map_connection_state(state) {
                let _ = signal_tx.send(LinkSignal::ConnectionState(state));
            }
            Box::pin(async {})
        }));

        let shared = Arc::downgrade(self);
        let weak_link = Arc::downgrade(link);
        rtc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            let shared = shared.clone();
            let weak_link = weak_link.clone();
            Box::pin(async move {
                let label = channel.label().to_string();
                if !is_transfer_label(&label) {
                    debug!(label, "Remote channel opened");
                    return;
                }
                if let (Some(shared), Some(link)) = (shared.upgrade(), weak_link.upgrade()) {
                    shared.attach_inbound(&link, channel);
                }
            })
        }));

        let shared = Arc::downgrade(self);
        let weak_link = Arc::downgrade(link);
        rtc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let shared = shared.clone();
                let weak_link = weak_link.clone();
                Box::pin(async move {
                    let (Some(shared), Some(link)) = (shared.upgrade(), weak_link.upgrade()) else {
                        return;
                    };
                    let stream_id = track.stream_id().to_string();
                    debug!(stream_id, kind = %track.kind(), "Remote track arrived");
                    let routed = link.media.lock().on_track(&stream_id, track);
                    if let Some((stream_id, kind)) = routed {
                        shared.emit(PeerEvent::RemoteStream { stream_id, kind }).await;
                    }
                })
            },
        ));
    }

    fn attach_inbound(&self, link: &Arc<Link>, channel: Arc<RTCDataChannel>) {
        let label = channel.label().to_string();
        let bound = link.inbound.lock().attach(&label);
        debug!(label, bound, "Inbound transfer channel");

        let weak_link = Arc::downgrade(link);
        let events = self.event_tx.clone();
        let message_label = label.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let weak_link = weak_link.clone();
            let events = events.clone();
            let label = message_label.clone();
            Box::pin(async move {
                if let Some(link) = weak_link.upgrade() {
                    link.on_chunk(&label, msg.data, &events).await;
                }
            })
        }));

        let weak_link = Arc::downgrade(link);
        let events = self.event_tx.clone();
        channel.on_close(Box::new(move || {
            let weak_link = weak_link.clone();
            let events = events.clone();
            let label = label.clone();
            Box::pin(async move {
                debug!(label, "Inbound transfer channel closed");
                if let Some(link) = weak_link.upgrade() {
                    link.on_transfer_channel_closed(&label, &events).await;
                }
            })
        }));
    }

    fn start_sampler(&self, link: &Link) {
        if !self.config.stats.enabled {
            return;
        }
        let mut sampler = link.sampler.lock();
        if sampler.is_none() {
            let source = Arc::new(PeerStatsSource::new(Arc::clone(link.peer.rtc())));
            *sampler = Some(StatsSampler::start(source, self.config.stats.clone()));
        }
    }

    async fn teardown_link(&self, reason: &str) {
        let link = self.link.lock().take();
        if let Some(link) = link {
            self.close_link(link, reason).await;
        }
    }

    async fn teardown_if_current(&self, link: &Arc<Link>, reason: &str) {
        let current = {
            let mut slot = self.link.lock();
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, link)) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(link) = current {
            self.close_link(link, reason).await;
        }
    }

    async fn close_link(&self, link: Arc<Link>, reason: &str) {
        info!(reason, "Closing peer link");

        let aborted = link.inbound.lock().abort();
        if let Some((metadata, received)) = aborted {
            self.emit(PeerEvent::transfer_failed(
                TransferDirection::Inbound,
                format!(
                    "{} interrupted ({}): received {} of {} bytes",
                    metadata.name, reason, received, metadata.size
                ),
            ))
            .await;
        }

        // Dropping the waiter fails a send blocked on `ready`
        link.ready.lock().take();

        let sampler = link.sampler.lock().take();
        if let Some(mut sampler) = sampler {
            sampler.stop();
            self.stats_log.lock().extend(sampler.snapshots());
        }

        link.media.lock().clear();

        if let Err(e) = link.peer.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }
}

async fn emit(events: &mpsc::Sender<PeerEvent>, event: PeerEvent) {
    let name = event.name();
    if events.send(event).await.is_err() {
        debug!(event = name, "Event receiver dropped");
    }
}

async fn run_link_signals(
    shared: Weak<SessionShared>,
    link: Weak<Link>,
    mut signal_rx: mpsc::UnboundedReceiver<LinkSignal>,
) {
    while let Some(signal) = signal_rx.recv().await {
        let Some(link) = link.upgrade() else {
            break;
        };

        match signal {
            LinkSignal::NegotiationNeeded => {
                if let Err(e) = link.negotiator.on_negotiation_needed().await {
                    warn!("Negotiation failed: {}", e);
                }
            }
            LinkSignal::ConnectionState(state) => {
                let result = link.negotiator.on_connection_state(state).await;

                if state == ConnectionState::Connected {
                    if let Some(shared) = shared.upgrade() {
                        shared.start_sampler(&link);
                    }
                }

                if let Err(e) = result {
                    warn!(?state, "Connection state handling failed: {}", e);
                }

                if link.negotiator.is_closed() {
                    if let Some(shared) = shared.upgrade() {
                        let reason = format!("connection {:?}", state).to_lowercase();
                        shared.teardown_if_current(&link, &reason).await;
                    }
                    break;
                }
            }
        }
    }

    debug!("Link signal task terminated");
}

async fn run_dispatch(shared: Arc<SessionShared>, mut server_rx: mpsc::Receiver<ServerMessage>) {
    while let Some(message) = server_rx.recv().await {
        let name = message.name();
        if let Err(e) = shared.handle_server_message(message).await {
            warn!(message = name, "Failed to handle signaling message: {}", e);
            shared.emit(PeerEvent::error(e.to_string())).await;
        }
    }

    info!("Signaling stream ended");
    shared.teardown_link("signaling closed").await;
    shared
        .emit(PeerEvent::error("signaling connection closed"))
        .await;
}

async fn run_forwarder(shared: Weak<SessionShared>, mut peer_rx: mpsc::Receiver<PeerMessage>) {
    while let Some(message) = peer_rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if let Err(e) = shared.signaling.relay(&shared.config.room_id, &message) {
            warn!(message = message.name(), "Failed to relay peer message: {}", e);
        }
    }

    debug!("Peer message forwarder terminated");
}

async fn open_transfer_channel(
    peer: Arc<PeerConnection>,
    label: String,
    ready_rx: oneshot::Receiver<()>,
    ready_timeout: Duration,
    open_timeout: Duration,
) -> duet_core::Result<Arc<DataChannel>> {
    match tokio::time::timeout(ready_timeout, ready_rx).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            return Err(duet_core::Error::ChannelClosed(
                "partner went away before ready".to_string(),
            ))
        }
        Err(_) => {
            return Err(duet_core::Error::TransportError(format!(
                "no ready from partner within {:?}",
                ready_timeout
            )))
        }
    }

    let rtc_channel = peer.create_data_channel(&label).await?;
    let channel = DataChannel::new(rtc_channel).await;
    channel.wait_open(open_timeout).await?;
    Ok(Arc::new(channel))
}

/// A room membership with its current peer link
///
/// # Example
///
/// ```no_run
/// use duet_webrtc::{PeerConfig, PeerSession};
/// use duet_core::PeerEvent;
///
/// # async fn run() -> duet_webrtc::Result<()> {
/// let config = PeerConfig::new("ws://localhost:8080", "R1");
/// let (session, mut events) = PeerSession::connect(config).await?;
///
/// while let Some(event) = events.recv().await {
///     if let PeerEvent::PeerConnected = event {
///         session.send_payload("hello.txt", "hi".into()).await?;
///         break;
///     }
/// }
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct PeerSession {
    shared: Arc<SessionShared>,
    dispatch: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl PeerSession {
    /// Connect to the signaling server and ask to join the configured room
    ///
    /// Admission results and everything after arrive on the returned event
    /// receiver.
    #[instrument(skip(config), fields(room = %config.room_id))]
    pub async fn connect(config: PeerConfig) -> Result<(Self, mpsc::Receiver<PeerEvent>)> {
        config.validate()?;

        let (signaling, server_rx) = SignalingClient::connect(&config.signaling_url).await?;
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let (peer_tx, peer_rx) = mpsc::channel(PEER_MESSAGE_BUFFER);
        let sender = ChunkSender::new(config.transfer.clone())?.with_events(event_tx.clone());

        let shared = Arc::new(SessionShared {
            config,
            signaling,
            peer_tx,
            event_tx,
            sender,
            role: Mutex::new(None),
            link: Mutex::new(None),
            stats_log: Mutex::new(Vec::new()),
            transfer_lock: tokio::sync::Mutex::new(()),
        });

        let forwarder = tokio::spawn(run_forwarder(Arc::downgrade(&shared), peer_rx));
        let dispatch = tokio::spawn(run_dispatch(Arc::clone(&shared), server_rx));

        shared.signaling.join(&shared.config.room_id)?;

        Ok((
            Self {
                shared,
                dispatch,
                forwarder,
            },
            event_rx,
        ))
    }

    /// Room this session joined
    pub fn room_id(&self) -> &str {
        &self.shared.config.room_id
    }

    /// Role from room admission, once admitted
    pub fn role(&self) -> Option<PoliteRole> {
        *self.shared.role.lock()
    }

    /// Whether a partner is present
    pub fn has_partner(&self) -> bool {
        self.shared.link.lock().is_some()
    }

    /// Whether the peer connection to the partner is established
    pub fn is_connected(&self) -> bool {
        self.shared
            .current_link()
            .is_some_and(|link| link.negotiator.is_connected() && !link.negotiator.is_closed())
    }

    /// Stream `payload` to the partner under `name`
    ///
    /// Announces the transfer over signaling, waits for the partner's `ready`,
    /// opens a dedicated ordered data channel and streams chunks paced by the
    /// configured watermarks. One outbound transfer runs at a time; concurrent
    /// calls queue.
    pub async fn send_payload(&self, name: &str, payload: Bytes) -> Result<SendReport> {
        let _transfer = self.shared.transfer_lock.lock().await;

        let link = self
            .shared
            .current_link()
            .ok_or_else(|| Error::SessionError("no partner in the room".to_string()))?;
        if !link.negotiator.is_connected() || link.negotiator.is_closed() {
            return Err(Error::SessionError(
                "peer connection not established".to_string(),
            ));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        *link.ready.lock() = Some(ready_tx);

        let label = format!("{}{}", TRANSFER_CHANNEL_PREFIX, Uuid::new_v4());
        let peer = Arc::clone(&link.peer);
        let ready_timeout = self.shared.config.ready_timeout();
        let open_timeout = self.shared.config.channel_open_timeout();
        let open_channel =
            move || open_transfer_channel(peer, label, ready_rx, ready_timeout, open_timeout);

        match self
            .shared
            .sender
            .send(name, payload, &self.shared.peer_tx, open_channel)
            .await
        {
            Ok(report) => {
                self.shared
                    .emit(PeerEvent::TransferCompleted {
                        name: report.name.clone(),
                        bytes: report.bytes_sent,
                        truncated: report.truncated,
                    })
                    .await;
                Ok(report)
            }
            Err(e) => {
                link.ready.lock().take();
                warn!(name, "Outbound transfer failed: {}", e);
                self.shared
                    .emit(PeerEvent::transfer_failed(
                        TransferDirection::Outbound,
                        e.to_string(),
                    ))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Publish a local track tagged with the content it carries
    pub async fn publish_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
        kind: ContentKind,
    ) -> Result<()> {
        let link = self
            .shared
            .current_link()
            .ok_or_else(|| Error::SessionError("no partner in the room".to_string()))?;
        media::publish_track(&link.peer, track, kind, &self.shared.peer_tx).await?;
        Ok(())
    }

    /// Routed remote tracks carrying `kind`
    pub fn remote_tracks(&self, kind: ContentKind) -> Vec<Arc<TrackRemote>> {
        self.shared
            .current_link()
            .map(|link| link.media.lock().tracks(kind))
            .unwrap_or_default()
    }

    /// Stats collected so far, across every link of this session
    pub fn stats(&self) -> Vec<StatsSnapshot> {
        let mut samples = self.shared.stats_log.lock().clone();
        if let Some(link) = self.shared.current_link() {
            if let Some(sampler) = link.sampler.lock().as_ref() {
                samples.extend(sampler.snapshots());
            }
        }
        samples
    }

    /// Upload collected stats to the signaling server under `name`
    ///
    /// Returns the number of samples sent. The server answers with an error
    /// message only when it cannot persist the report.
    pub fn upload_stats(&self, name: &str) -> Result<usize> {
        let samples = self.stats();
        let count = samples.len();
        self.shared
            .signaling
            .report_stats(&self.shared.config.room_id, name, samples)?;
        info!(name, samples = count, "Stats report uploaded");
        Ok(count)
    }

    /// Leave the room and close the link and signaling connection
    pub async fn close(self) {
        self.dispatch.abort();
        self.shared.teardown_link("session closed").await;

        if let Err(e) = self.shared.signaling.leave(&self.shared.config.room_id) {
            debug!("Leave not sent: {}", e);
        }
        self.shared.signaling.close().await;
        info!(room = %self.shared.config.room_id, "Session closed");
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        self.dispatch.abort();
        self.forwarder.abort();
    }
}
