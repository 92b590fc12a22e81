//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(address) = std::env::var("TCPSERVE_ADDRESS") {
            config.server.address = address;
        }

        if let Ok(max_conns) = std::env::var("TCPSERVE_MAX_CONNS") {
            config.server.max_conns = max_conns
                .parse::<usize>()
                .with_context(|| format!("Invalid TCPSERVE_MAX_CONNS: {}", max_conns))?;
        }

        if let Ok(timeout) = std::env::var("TCPSERVE_TIMEOUT") {
            config.server.timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid TCPSERVE_TIMEOUT: {}", timeout))?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.address.is_empty() {
            bail!("address must not be empty");
        }

        // Hostnames are resolved at bind time, never here: validation must
        // not block on DNS. Accept a literal socket address, or any
        // host:port whose port parses.
        if self.server.address.parse::<SocketAddr>().is_err() {
            let structurally_valid = self
                .server
                .address
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !structurally_valid {
                bail!("address is not a valid host:port: {}", self.server.address);
            }
        }

        if self.server.max_conns == 0 {
            bail!("max_conns must be greater than 0");
        }

        if self.server.max_conns > 100_000 {
            bail!("max_conns cannot exceed 100,000 for safety");
        }

        if self.server.timeout.is_zero() {
            bail!("timeout must be greater than 0");
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        max_conns: Option<usize>,
        timeout: Option<u64>,
    ) {
        if let Some(bind) = bind {
            self.server.address = bind.to_string();
            tracing::info!("CLI override: address set to {}", bind);
        }

        if let Some(max_conns) = max_conns {
            self.server.max_conns = max_conns;
            tracing::info!("CLI override: max connections set to {}", max_conns);
        }

        if let Some(timeout_secs) = timeout {
            self.server.timeout = Duration::from_secs(timeout_secs);
            tracing::info!("CLI override: timeout set to {}s", timeout_secs);
        }
    }
}
