//! Configuration Types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on, host:port
    pub address: String,
    /// Maximum number of concurrent connections; connections beyond this
    /// bound are dropped at accept time
    pub max_conns: usize,
    /// Idle/operation timeout handed to handlers; the accept loop itself
    /// does not enforce it
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                address: "127.0.0.1:6399".to_string(),
                max_conns: 1000,
                timeout: Duration::from_secs(60),
            },
        }
    }
}
