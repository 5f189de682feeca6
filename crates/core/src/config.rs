//! Configuration types for chunked transfer and stats sampling

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default chunk size (256 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default high-water mark for the channel's buffered amount (1 MiB)
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024 * 1024;

/// Default low-water mark for the channel's buffered amount (512 KiB)
pub const DEFAULT_LOW_WATER_MARK: usize = 512 * 1024;

/// Largest message accepted by the transfer channel unless the transport says otherwise (16 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Chunked transfer configuration
///
/// The watermark pair must satisfy `high_water_mark > chunk_size` and
/// `high_water_mark - low_water_mark >= chunk_size`, otherwise the sender
/// would pause and resume on every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Payload bytes per chunk (default: 256 KiB)
    pub chunk_size: usize,

    /// Sending pauses while queuing another chunk would exceed this many buffered bytes
    pub high_water_mark: usize,

    /// Sending resumes once the buffered amount drops to this level
    pub low_water_mark: usize,

    /// Maximum message size of the underlying channel
    pub max_message_size: usize,

    /// Minimum spacing between progress updates in milliseconds (default: 100)
    pub progress_interval_ms: u64,

    /// Optional soft cutoff for a send, in milliseconds
    pub max_duration_ms: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            progress_interval_ms: 100,
            max_duration_ms: None,
        }
    }
}

impl TransferConfig {
    /// Default configuration with the chunk size capped to a transport's message limit
    ///
    /// # Example
    ///
    /// ```
    /// use duet_core::config::TransferConfig;
    ///
    /// let config = TransferConfig::for_message_limit(64 * 1024);
    /// assert_eq!(config.chunk_size, 64 * 1024);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn for_message_limit(max_message_size: usize) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE.min(max_message_size),
            max_message_size,
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `chunk_size` is zero or larger than `max_message_size`
    /// - `high_water_mark` is not strictly greater than `chunk_size`
    /// - `low_water_mark` is not below `high_water_mark` by at least one chunk
    /// - `progress_interval_ms` is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.chunk_size > self.max_message_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} exceeds max_message_size {}",
                self.chunk_size, self.max_message_size
            )));
        }

        if self.high_water_mark <= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "high_water_mark {} must be greater than chunk_size {}",
                self.high_water_mark, self.chunk_size
            )));
        }

        if self.low_water_mark >= self.high_water_mark
            || self.high_water_mark - self.low_water_mark < self.chunk_size
        {
            return Err(Error::InvalidConfig(format!(
                "high_water_mark - low_water_mark must be at least chunk_size {}, got {} - {}",
                self.chunk_size, self.high_water_mark, self.low_water_mark
            )));
        }

        if self.progress_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "progress_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Progress throttle interval
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Soft cutoff for a send, if configured
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }
}

/// Stats sampler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Enable periodic sampling (default: true)
    pub enabled: bool,

    /// Sampling interval in milliseconds (default: 1000)
    pub interval_ms: u64,

    /// Oldest samples are dropped beyond this count (default: 3600)
    pub max_samples: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            max_samples: 3600,
        }
    }
}

impl StatsConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms < 100 || self.interval_ms > 60_000 {
            return Err(Error::InvalidConfig(format!(
                "interval_ms must be in range 100-60000, got {}",
                self.interval_ms
            )));
        }

        if self.max_samples == 0 {
            return Err(Error::InvalidConfig(
                "max_samples must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Sampling interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
