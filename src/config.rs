//! Process configuration.
//!
//! Loaded once at startup from an optional JSON file; every field has a
//! default so a partial file (or none at all) is valid. Nothing is
//! written back.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::rpc::DispatcherConfig;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local identity, written as `src` on outbound frames.
    pub device_id: String,
    pub rpc: RpcConfig,
    pub board: BoardConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Default peer for outbound calls, e.g. `tcp://192.168.1.4:1884`.
    /// Absent or empty means outbound calls need an explicit destination.
    pub peer: Option<String>,
    /// Address the TCP listener binds.
    pub listen: String,
    /// Pending calls older than this fail with `TimedOut`. `None`
    /// leaves them pending until a reply or channel loss.
    pub call_timeout_ms: Option<u64>,
    /// Period of the channel diagnostics log.
    pub channel_info_interval_ms: u64,
    /// How often pending calls are checked against the timeout.
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Edges closer together than this count as one press.
    pub btn_debounce_ms: u64,
    /// Status LED polarity.
    pub led_active_high: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: "peerlink".into(),
            rpc: RpcConfig::default(),
            board: BoardConfig::default(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            peer: None,
            listen: "0.0.0.0:1884".into(),
            call_timeout_ms: Some(10_000),
            channel_info_interval_ms: 1000,
            sweep_interval_ms: 500,
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            btn_debounce_ms: 20,
            led_active_high: true,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid configuration JSON")
    }

    /// Read and parse `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Default peer with empty strings treated as unset.
    pub fn peer(&self) -> Option<&str> {
        self.rpc.peer.as_deref().filter(|p| !p.is_empty())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            local_id: self.device_id.clone(),
            default_peer: self.peer().map(str::to_owned),
            call_timeout: self.rpc.call_timeout_ms.map(Duration::from_millis),
        }
    }
}
