//! WebRTC peer connection wrapper
//!
//! Owns one `RTCPeerConnection` and exposes it to the negotiator through
//! [`NegotiationTransport`]. Callback wiring lives in the session, which
//! reaches the raw connection through [`PeerConnection::rtc`].

use crate::config::PeerConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use duet_core::negotiation::{ConnectionState, NegotiationTransport, SignalingState};
use duet_core::protocol::{IceCandidate, SdpKind, SessionDescription};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

type CoreResult<T> = duet_core::Result<T>;

/// WebRTC peer connection wrapper
pub struct PeerConnection {
    peer_connection: Arc<RTCPeerConnection>,
}

impl PeerConnection {
    /// Create a new peer connection with default codecs and interceptors
    #[instrument(skip(config), fields(room = %config.room_id))]
    pub async fn new(config: &PeerConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(|e| {
            Error::PeerConnectionError(format!("Failed to register codecs: {}", e))
        })?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
        })?);

        info!("Peer connection created");

        Ok(Self { peer_connection })
    }

    /// The underlying webrtc-rs connection
    pub fn rtc(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    /// Create an ordered, reliable data channel
    pub async fn create_data_channel(&self, label: &str) -> Result<Arc<RTCDataChannel>> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };

        let channel = self
            .peer_connection
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| {
                Error::DataChannelError(format!("Failed to create channel {}: {}", label, e))
            })?;

        debug!(label, "Data channel created");
        Ok(channel)
    }

    /// Attach a local track; triggers renegotiation
    pub async fn add_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
    ) -> Result<Arc<RTCRtpSender>> {
        self.peer_connection
            .add_track(track)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))
    }

    /// Close the connection
    pub async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close: {}", e)))
    }

    fn to_rtc_description(description: SessionDescription) -> CoreResult<RTCSessionDescription> {
        let parsed = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        };
        parsed.map_err(|e| duet_core::Error::SdpError(format!("Invalid SDP: {}", e)))
    }

    async fn applied_local(&self, kind: SdpKind) -> CoreResult<SessionDescription> {
        let local = self.peer_connection.local_description().await.ok_or_else(|| {
            duet_core::Error::SdpError("Local description missing after apply".to_string())
        })?;
        Ok(SessionDescription {
            kind,
            sdp: local.sdp,
        })
    }
}

#[async_trait]
impl NegotiationTransport for PeerConnection {
    fn signaling_state(&self) -> SignalingState {
        map_signaling_state(self.peer_connection.signaling_state())
    }

    async fn create_local_offer(&self, ice_restart: bool) -> CoreResult<SessionDescription> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });

        let offer = self
            .peer_connection
            .create_offer(options)
            .await
            .map_err(|e| duet_core::Error::SdpError(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| {
                duet_core::Error::SdpError(format!("Failed to set local offer: {}", e))
            })?;

        self.applied_local(SdpKind::Offer).await
    }

    async fn create_local_answer(&self) -> CoreResult<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| duet_core::Error::SdpError(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| {
                duet_core::Error::SdpError(format!("Failed to set local answer: {}", e))
            })?;

        self.applied_local(SdpKind::Answer).await
    }

    async fn set_remote_description(&self, description: SessionDescription) -> CoreResult<()> {
        let description = Self::to_rtc_description(description)?;
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| {
                duet_core::Error::SdpError(format!("Failed to set remote description: {}", e))
            })
    }

    async fn rollback(&self) -> CoreResult<()> {
        let Some(mut pending) = self.peer_connection.pending_local_description().await else {
            return Ok(());
        };
        pending.sdp_type = RTCSdpType::Rollback;

        self.peer_connection
            .set_local_description(pending)
            .await
            .map_err(|e| duet_core::Error::SdpError(format!("Rollback failed: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> CoreResult<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| duet_core::Error::IceCandidateError(e.to_string()))
    }
}

/// Collapse webrtc-rs signaling states onto the negotiator's view
pub fn map_signaling_state(state: RTCSignalingState) -> SignalingState {
    match state {
        RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
            SignalingState::HaveLocalOffer
        }
        RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
            SignalingState::HaveRemoteOffer
        }
        RTCSignalingState::Closed => SignalingState::Closed,
        RTCSignalingState::Stable | RTCSignalingState::Unspecified => SignalingState::Stable,
    }
}

/// Map webrtc-rs connection states; `Unspecified` carries no information
pub fn map_connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

/// Convert a gathered candidate into its wire form
pub fn candidate_from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_only_config() -> PeerConfig {
        PeerConfig::new("ws://localhost:8080", "R1").with_stun_servers(Vec::new())
    }

    #[test]
    fn test_signaling_state_mapping() {
        assert_eq!(
            map_signaling_state(RTCSignalingState::HaveLocalPranswer),
            SignalingState::HaveLocalOffer
        );
        assert_eq!(
            map_signaling_state(RTCSignalingState::HaveRemoteOffer),
            SignalingState::HaveRemoteOffer
        );
        assert_eq!(
            map_signaling_state(RTCSignalingState::Unspecified),
            SignalingState::Stable
        );
    }

    #[test]
    fn test_connection_state_mapping() {
        assert_eq!(
            map_connection_state(RTCPeerConnectionState::Failed),
            Some(ConnectionState::Failed)
        );
        assert_eq!(map_connection_state(RTCPeerConnectionState::Unspecified), None);
    }

    #[test]
    fn test_candidate_conversion() {
        let candidate = candidate_from_init(RTCIceCandidateInit {
            candidate: "candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        });
        assert_eq!(candidate.sdp_m_line_index, Some(0));
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_new_connection_is_stable() {
        let pc = PeerConnection::new(&host_only_config()).await.unwrap();
        assert_eq!(pc.signaling_state(), SignalingState::Stable);
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_offer_then_rollback() {
        let pc = PeerConnection::new(&host_only_config()).await.unwrap();
        pc.create_data_channel("control").await.unwrap();

        let offer = pc.create_local_offer(false).await.unwrap();
        assert!(offer.is_offer());
        assert!(offer.sdp.contains("webrtc-datachannel"));
        assert_eq!(pc.signaling_state(), SignalingState::HaveLocalOffer);

        pc.rollback().await.unwrap();
        assert_eq!(pc.signaling_state(), SignalingState::Stable);
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_offer_answer_between_two_connections() {
        let offerer = PeerConnection::new(&host_only_config()).await.unwrap();
        let answerer = PeerConnection::new(&host_only_config()).await.unwrap();
        offerer.create_data_channel("control").await.unwrap();

        let offer = offerer.create_local_offer(false).await.unwrap();
        answerer.set_remote_description(offer).await.unwrap();
        assert_eq!(answerer.signaling_state(), SignalingState::HaveRemoteOffer);

        let answer = answerer.create_local_answer().await.unwrap();
        assert!(!answer.is_offer());
        offerer.set_remote_description(answer).await.unwrap();

        assert_eq!(offerer.signaling_state(), SignalingState::Stable);
        assert_eq!(answerer.signaling_state(), SignalingState::Stable);

        offerer.close().await.unwrap();
        answerer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_sdp_rejected() {
        let pc = PeerConnection::new(&host_only_config()).await.unwrap();
        let err = pc
            .set_remote_description(SessionDescription::offer("not sdp"))
            .await
            .unwrap_err();
        assert!(err.is_negotiation_error());
        pc.close().await.unwrap();
    }
}
