//! Signaling server configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Signaling server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:8080)
    pub bind_address: String,

    /// Directory for persisted stats reports; reports are rejected when unset
    pub report_dir: Option<PathBuf>,

    /// Queued outbound frames per connection before relaying to it blocks (default: 128)
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            report_dir: None,
            outbound_buffer: 128,
        }
    }
}

impl ServerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.outbound_buffer == 0 {
            return Err(Error::InvalidConfig(
                "outbound_buffer must be greater than 0".to_string(),
            ));
        }

        if let Some(ref dir) = self.report_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(
                    "report_dir must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address.parse().map_err(|e| {
            Error::InvalidConfig(format!(
                "bind_address '{}' is not a socket address: {}",
                self.bind_address, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_bind_address() {
        let config = ServerConfig {
            bind_address: "localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let config = ServerConfig {
            outbound_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
