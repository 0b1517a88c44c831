use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use tracing::info;

use crate::resolver::forward::ForwardOptions;

/// Downstream that resolves through the system resolv.conf.
pub const DOWNSTREAM_LOCALHOST: &str = "localhost";
/// Downstream that disables forwarding.
pub const DOWNSTREAM_NONE: &str = "none";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// UDP listen address. Defaults to 0.0.0.0:5353 so no privileged port is needed.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Comma-separated downstreams; `localhost` means the system config, `none` means no forwarding.
    #[serde(default = "default_downstreams")]
    pub downstreams: String,
    /// Record downstream answers into the rule set.
    #[serde(default)]
    pub record: bool,
    /// Rule file to replay (JSON).
    #[serde(default)]
    pub replay_file: Option<PathBuf>,
    /// Recording output file; printed to stdout when unset.
    #[serde(default)]
    pub record_file: Option<PathBuf>,
    /// Path of the system resolver config.
    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: PathBuf,
    /// Upstream timeout in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,
    /// Port used for upstreams given without one.
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Number of UDP workers (0 means one per CPU).
    #[serde(default)]
    pub udp_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            downstreams: default_downstreams(),
            record: false,
            replay_file: None,
            record_file: None,
            resolv_conf: default_resolv_conf(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            default_port: default_port(),
            udp_workers: 0,
        }
    }
}

impl Settings {
    /// Downstream selectors in order, blanks dropped.
    pub fn downstreams(&self) -> Vec<String> {
        self.downstreams
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn forward_options(&self) -> ForwardOptions {
        ForwardOptions {
            timeout: self.upstream_timeout(),
            default_port: self.default_port,
        }
    }

    /// Recording needs a store to write into even without a replay file.
    pub fn wants_store(&self) -> bool {
        self.replay_file.is_some() || self.record || self.record_file.is_some()
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let cfg: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("parse config file: {}", path.display()))?;

    if cfg.default_port == 0 {
        anyhow::bail!("default_port must be non-zero");
    }
    if cfg.upstream_timeout_ms == 0 {
        anyhow::bail!("upstream_timeout_ms must be non-zero");
    }

    info!(target = "config", path = %path.display(), "config loaded");
    Ok(cfg)
}


fn default_listen_addr() -> String {
    "0.0.0.0:5353".to_string()
}

fn default_downstreams() -> String {
    DOWNSTREAM_LOCALHOST.to_string()
}

fn default_resolv_conf() -> PathBuf {
    PathBuf::from("/etc/resolv.conf")
}

fn default_upstream_timeout_ms() -> u64 {
    5000
}

fn default_port() -> u16 {
    53
}
