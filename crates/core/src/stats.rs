//! Periodic transport stats sampling
//!
//! The sampler is diagnostics only: a failed sample is logged and retried on
//! the next tick, and nothing on the negotiation or transfer paths waits on it.

use crate::config::StatsConfig;
use crate::protocol::ClientMessage;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// One sample of transport counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Bytes sent on the selected candidate pair
    pub bytes_sent: u64,
    /// Bytes received on the selected candidate pair
    pub bytes_received: u64,
    /// Current round-trip time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_trip_time_ms: Option<f64>,
    /// Interarrival jitter in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    /// Fraction of packets lost (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_loss_fraction: Option<f64>,
}

impl StatsSnapshot {
    /// Sample with byte counters only
    pub fn new(bytes_sent: u64, bytes_received: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            bytes_sent,
            bytes_received,
            round_trip_time_ms: None,
            jitter_ms: None,
            packet_loss_fraction: None,
        }
    }
}

/// Anything that can report transport counters
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Take one sample; fails while the transport is not ready
    async fn sample(&self) -> Result<StatsSnapshot>;
}

/// Background sampler with an append-only, size-bounded log
pub struct StatsSampler {
    log: Arc<Mutex<VecDeque<StatsSnapshot>>>,
    task: Option<JoinHandle<()>>,
}

impl StatsSampler {
    /// Start sampling `source` every `config.interval_ms`
    pub fn start(source: Arc<dyn StatsSource>, config: StatsConfig) -> Self {
        let log = Arc::new(Mutex::new(VecDeque::new()));
        let task_log = Arc::clone(&log);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                match source.sample().await {
                    Ok(snapshot) => {
                        let mut log = task_log.lock();
                        if log.len() == config.max_samples {
                            log.pop_front();
                        }
                        log.push_back(snapshot);
                    }
                    Err(e) => {
                        debug!("Stats sample skipped: {}", e);
                    }
                }
            }
        });

        info!("Stats sampler started");

        Self {
            log,
            task: Some(task),
        }
    }

    /// Copy of the log, oldest first
    pub fn snapshots(&self) -> Vec<StatsSnapshot> {
        self.log.lock().iter().cloned().collect()
    }

    /// Number of samples collected
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether no samples were collected yet
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Build a `stats-report` envelope from the log
    pub fn report(&self, room_id: &str, name: &str) -> ClientMessage {
        ClientMessage::StatsReport {
            room_id: room_id.to_string(),
            name: name.to_string(),
            samples: self.snapshots(),
        }
    }

    /// Stop sampling; the log stays readable
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Stats sampler stopped");
        }
    }
}

impl Drop for StatsSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
