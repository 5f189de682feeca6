//! Content-tagged media tracks

use crate::peer::PeerConnection;
use crate::{Error, Result};
use duet_core::content::{ContentRouter, RoutedStream};
use duet_core::protocol::{ContentKind, PeerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

/// Tag `track`'s stream, then attach the track
///
/// The tag goes out first so the partner can usually route the track the
/// moment it arrives; the router covers the opposite order.
pub async fn publish_track(
    peer: &PeerConnection,
    track: Arc<dyn TrackLocal + Send + Sync>,
    kind: ContentKind,
    signaling_tx: &mpsc::Sender<PeerMessage>,
) -> Result<Arc<RTCRtpSender>> {
    let stream_id = track.stream_id().to_string();

    signaling_tx
        .send(PeerMessage::ContentTag {
            stream_id: stream_id.clone(),
            tag: kind,
        })
        .await
        .map_err(|_| Error::SignalingError("signaling path closed".to_string()))?;

    let sender = peer.add_track(track).await?;
    info!(stream_id, %kind, "Published local track");
    Ok(sender)
}

/// Remote tracks routed by content tag
#[derive(Debug)]
pub struct RemoteTracks<T> {
    router: ContentRouter<T>,
    routed: Vec<RoutedStream<T>>,
}

impl<T> Default for RemoteTracks<T> {
    fn default() -> Self {
        Self {
            router: ContentRouter::new(),
            routed: Vec::new(),
        }
    }
}

impl<T: Clone> RemoteTracks<T> {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tag; returns the streams it released
    pub fn on_tag(&mut self, stream_id: &str, kind: ContentKind) -> Vec<(String, ContentKind)> {
        let released = self.router.on_tag(stream_id, kind);
        let summary = released
            .iter()
            .map(|routed| (routed.stream_id.clone(), routed.kind))
            .collect();
        self.routed.extend(released);
        summary
    }

    /// Record a track; returns its stream once routed
    pub fn on_track(&mut self, stream_id: &str, track: T) -> Option<(String, ContentKind)> {
        let routed = self.router.on_track(stream_id, track)?;
        let summary = (routed.stream_id.clone(), routed.kind);
        self.routed.push(routed);
        Some(summary)
    }

    /// Routed tracks carrying `kind`, in arrival order
    pub fn tracks(&self, kind: ContentKind) -> Vec<T> {
        self.routed
            .iter()
            .filter(|routed| routed.kind == kind)
            .map(|routed| routed.track.clone())
            .collect()
    }

    /// Tracks still waiting for a tag
    pub fn unidentified_count(&self) -> usize {
        self.router.unidentified_count()
    }

    /// Forget everything (the partner left)
    pub fn clear(&mut self) {
        self.router.clear();
        self.routed.clear();
    }
}
