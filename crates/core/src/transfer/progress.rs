use std::time::Duration;
use tokio::time::Instant;

/// Rate limiter for progress updates
///
/// Lets through the first update and then at most one per interval. Final
/// updates bypass the throttle and are emitted by the caller unconditionally.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    /// Create a throttle with the given minimum spacing
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether an update is due now; records the emission when it is
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        let due = self
            .last
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}
