//! Receive-side configuration.
//!
//! `RecvConfig` is loaded from JSON (every field optional, with defaults) and
//! then overridden from CLI flags. It is fixed once the receive loop starts.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::packet::{ETHER_HEADER_LEN, IPV4_MIN_HEADER_LEN};
use crate::packet::SyntheticLink;

/// Responder deduplication strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMethod {
    /// Exact per-address bitmap.
    #[default]
    Full,
    /// Bounded LRU over (address, port).
    Window,
    /// No deduplication.
    None,
}

impl DedupMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Window => "window",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for DedupMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("dedup_window_size must be positive when dedup_method is 'window'")]
    ZeroWindow,

    #[error("data_link_size {0} leaves no room for an IPv4 header in a captured frame")]
    LinkTooLarge(usize),

    #[error("IP-only capture delivers bare IP packets; data_link_size must be 0, not {0}")]
    IpOnlyLinkSize(usize),
}

fn default_data_link_size() -> usize {
    ETHER_HEADER_LEN
}

fn default_window_size() -> usize {
    1_000_000
}

fn default_true() -> bool {
    true
}

fn default_cooldown_secs() -> u64 {
    8
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_dryrun_idle_ms() -> u64 {
    1000
}

fn default_stats_interval_ms() -> u64 {
    1000
}

/// Receive-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecvConfig {
    /// Capture interface name (informational for the loop itself).
    pub interface: String,
    /// Bytes of link-layer header preceding the IP header in captured buffers.
    #[serde(default = "default_data_link_size")]
    pub data_link_size: usize,
    /// IP-only capture: frames carry no Ethernet header and get a synthetic one.
    pub send_ip_pkts: bool,
    pub dedup_method: DedupMethod,
    #[serde(default = "default_window_size")]
    pub dedup_window_size: usize,
    /// Exclude unsuccessful and repeated responses from output.
    #[serde(default = "default_true")]
    pub default_mode: bool,
    /// Stop after this many filtered results (0 = unlimited).
    pub max_results: u64,
    /// Seconds to keep listening after the sender finishes.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Never touch the network.
    pub dryrun: bool,
    /// Ports probed by the sender; replies must originate from one of them.
    pub target_ports: Vec<u16>,
    /// Filter expression over fieldset values (None = accept all).
    pub filter: Option<String>,
    /// Fields handed to the output module, in order (empty = all).
    pub output_fields: Vec<String>,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_dryrun_idle_ms")]
    pub dryrun_idle_ms: u64,
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}

impl Default for RecvConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            data_link_size: default_data_link_size(),
            send_ip_pkts: false,
            dedup_method: DedupMethod::default(),
            dedup_window_size: default_window_size(),
            default_mode: true,
            max_results: 0,
            cooldown_secs: default_cooldown_secs(),
            dryrun: false,
            target_ports: Vec::new(),
            filter: None,
            output_fields: Vec::new(),
            poll_timeout_ms: default_poll_timeout_ms(),
            dryrun_idle_ms: default_dryrun_idle_ms(),
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

impl RecvConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate. With `send_ip_pkts` set and no explicit
    /// `data_link_size`, the link offset defaults to 0.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(s)?;
        let explicit_link = value.get("data_link_size").is_some();
        let mut config: Self = serde_json::from_value(value)?;
        if config.send_ip_pkts && !explicit_link {
            config.data_link_size = 0;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup_method == DedupMethod::Window && self.dedup_window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.send_ip_pkts && self.data_link_size != 0 {
            return Err(ConfigError::IpOnlyLinkSize(self.data_link_size));
        }
        let fits = self
            .data_link_size
            .checked_add(IPV4_MIN_HEADER_LEN)
            .is_some_and(|n| n <= SyntheticLink::CAPACITY);
        if !fits {
            return Err(ConfigError::LinkTooLarge(self.data_link_size));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = RecvConfig::default();
        assert_eq!(c.data_link_size, 14);
        assert_eq!(c.dedup_method, DedupMethod::Full);
        assert!(c.default_mode);
        assert_eq!(c.cooldown(), Duration::from_secs(8));
        assert_eq!(c.max_results, 0);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_uses_defaults() {
        let c = RecvConfig::from_json_str(
            r#"{"dedup_method": "window", "dedup_window_size": 5000, "target_ports": [80, 443]}"#,
        )
        .unwrap();
        assert_eq!(c.dedup_method, DedupMethod::Window);
        assert_eq!(c.dedup_window_size, 5000);
        assert_eq!(c.target_ports, vec![80, 443]);
        assert_eq!(c.data_link_size, 14);
        assert!(c.default_mode);
        assert_eq!(c.cooldown_secs, 8);
    }

    #[test]
    fn test_from_json_rejects_zero_window() {
        let err = RecvConfig::from_json_str(r#"{"dedup_method": "window", "dedup_window_size": 0}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWindow));
    }

    #[test]
    fn test_from_json_rejects_unknown_dedup_method() {
        assert!(RecvConfig::from_json_str(r#"{"dedup_method": "bloom"}"#).is_err());
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = RecvConfig::from_json_file("/nonexistent/scanrecv.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_json_ip_only_defaults_link_size_to_zero() {
        let c = RecvConfig::from_json_str(r#"{"send_ip_pkts": true}"#).unwrap();
        assert!(c.send_ip_pkts);
        assert_eq!(c.data_link_size, 0);
    }

    #[test]
    fn test_from_json_ip_only_rejects_link_header() {
        let err = RecvConfig::from_json_str(r#"{"send_ip_pkts": true, "data_link_size": 14}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::IpOnlyLinkSize(14)));
    }

    #[test]
    fn test_oversized_link_size_rejected_without_overflow() {
        let err = RecvConfig::from_json_str(r#"{"data_link_size": 18446744073709551615}"#).unwrap_err();
        assert!(matches!(err, ConfigError::LinkTooLarge(usize::MAX)));
        let err = RecvConfig::from_json_str(
            r#"{"send_ip_pkts": true, "data_link_size": 18446744073709551615}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::IpOnlyLinkSize(usize::MAX)));
        let c = RecvConfig {
            data_link_size: SyntheticLink::CAPACITY,
            ..RecvConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::LinkTooLarge(_))));
    }

    #[test]
    fn test_dedup_method_display() {
        assert_eq!(DedupMethod::Full.to_string(), "full");
        assert_eq!(DedupMethod::Window.to_string(), "window");
        assert_eq!(DedupMethod::None.to_string(), "none");
    }
}
