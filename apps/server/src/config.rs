//! Environment-driven server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use quizsync_core::SyncConfig;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_url: String,
    pub data_dir: String,
    pub listen_addr: SocketAddr,
    pub sync: SyncConfig,
    /// Session token to start with, if the host already has one.
    pub initial_token: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_secs(name: &str, value: Option<String>) -> Result<Option<u64>> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => {
            let secs = raw
                .parse::<u64>()
                .with_context(|| format!("{} must be a whole number of seconds", name))?;
            if secs == 0 {
                return Err(anyhow!("{} must be greater than zero", name));
            }
            Ok(Some(secs))
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = non_empty(lookup("QUIZSYNC_API_URL"))
            .map(|v| v.trim_end_matches('/').to_string())
            .ok_or_else(|| anyhow!("QUIZSYNC_API_URL is not set"))?;
        let data_dir =
            non_empty(lookup("QUIZSYNC_DATA_DIR")).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let listen_addr = non_empty(lookup("QUIZSYNC_LISTEN_ADDR"))
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("QUIZSYNC_LISTEN_ADDR must be an address like 127.0.0.1:8787")?;

        let mut sync = SyncConfig::default();
        if let Some(secs) = parse_secs(
            "QUIZSYNC_POLL_INTERVAL_SECS",
            lookup("QUIZSYNC_POLL_INTERVAL_SECS"),
        )? {
            sync.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(
            "QUIZSYNC_BACKOFF_BASE_SECS",
            lookup("QUIZSYNC_BACKOFF_BASE_SECS"),
        )? {
            sync.backoff_base_secs = secs;
        }

        Ok(Self {
            api_url,
            data_dir,
            listen_addr,
            sync,
            initial_token: non_empty(lookup("QUIZSYNC_ACCESS_TOKEN")),
        })
    }
}
