//! Transport stats read from the peer connection's stats report

use async_trait::async_trait;
use duet_core::stats::{StatsSnapshot, StatsSource};
use parking_lot::Mutex;
use std::sync::Arc;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::stats::StatsReportType;

/// [`StatsSource`] backed by `RTCPeerConnection::get_stats`
///
/// Byte counters and round-trip time come from the nominated candidate pair;
/// packet loss from remote-inbound RTP reports when media is flowing. The
/// stats report carries no jitter figure, so jitter is estimated from the
/// variation between consecutive round-trip samples.
pub struct PeerStatsSource {
    peer_connection: Arc<RTCPeerConnection>,
    jitter: Mutex<JitterEstimator>,
}

impl PeerStatsSource {
    /// Sample `peer_connection`
    pub fn new(peer_connection: Arc<RTCPeerConnection>) -> Self {
        Self {
            peer_connection,
            jitter: Mutex::new(JitterEstimator::default()),
        }
    }
}

/// RFC 3550 (A.8) interarrival jitter over a series of delay samples
#[derive(Debug, Default)]
struct JitterEstimator {
    last_ms: Option<f64>,
    jitter_ms: Option<f64>,
}

impl JitterEstimator {
    /// Feed a delay sample, returning the current estimate
    ///
    /// Empty until two samples have been seen.
    fn update(&mut self, delay_ms: f64) -> Option<f64> {
        if let Some(last) = self.last_ms.replace(delay_ms) {
            let d = (delay_ms - last).abs();
            let j = self.jitter_ms.unwrap_or(0.0);
            self.jitter_ms = Some(j + (d - j) / 16.0);
        }
        self.jitter_ms
    }
}

#[async_trait]
impl StatsSource for PeerStatsSource {
    async fn sample(&self) -> duet_core::Result<StatsSnapshot> {
        let report = self.peer_connection.get_stats().await;

        let mut snapshot = None;
        let mut loss: Option<f64> = None;

        for stat in report.reports.values() {
            match stat {
                StatsReportType::CandidatePair(pair) if pair.nominated => {
                    let mut sample = StatsSnapshot::new(pair.bytes_sent, pair.bytes_received);
                    sample.round_trip_time_ms = Some(pair.current_round_trip_time * 1000.0);
                    snapshot = Some(sample);
                }
                StatsReportType::RemoteInboundRTP(remote) => {
                    let fraction = remote.fraction_lost;
                    loss = Some(loss.map_or(fraction, |current| current.max(fraction)));
                }
                _ => {}
            }
        }

        let mut snapshot = snapshot.ok_or_else(|| {
            duet_core::Error::TransportError("no nominated candidate pair yet".to_string())
        })?;
        snapshot.packet_loss_fraction = loss;
        if let Some(rtt) = snapshot.round_trip_time_ms {
            snapshot.jitter_ms = self.jitter.lock().update(rtt);
        }
        Ok(snapshot)
    }
}
