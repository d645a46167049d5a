//! scanrecv: receive-side engine of a stateless Internet-wide scanner.
//!
//! Probes are sent without per-target state; responses are matched back to
//! probes by a keyed validation token recomputed on receipt. This crate owns
//! the receive half: capture, validation, duplicate suppression, field
//! extraction, filtering, and output. Usable as a library or via the CLI.

pub mod capture;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod fieldset;
pub mod filter;
pub mod gateway;
pub mod output;
pub mod packet;
pub mod probe;
pub mod recv;
pub mod state;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

use serde::{Deserialize, Serialize};

// Re-export key types for library users.
pub use config::{ConfigError, DedupMethod, RecvConfig};
pub use recv::{Handshake, Receiver, RecvError, ScanContext};
pub use state::{RecvStats, RecvStatsSnapshot, SendState};
pub use validate::{ValidationToken, Validator};

// ─────────────────────────────────────────────────────────────────────────────
// Receive phase
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle phase of the receive thread.
///
/// Stored as a `u8` in [`RecvStats`] so monitors can read it without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RecvPhase {
    /// Not started.
    #[default]
    Idle = 0,
    /// Capture open, readiness published.
    Ready = 1,
    /// Sender active.
    Running = 2,
    /// Sender finished, waiting out the cooldown.
    Draining = 3,
    /// Capture closed, counters final.
    Finished = 4,
}

impl RecvPhase {
    /// Convert a raw u8, defaulting to Idle for unknown values.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Draining,
            4 => Self::Finished,
            _ => Self::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for RecvPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Port specification (parsed from CLI or config)
// ─────────────────────────────────────────────────────────────────────────────

/// Port specification: a single port, a range, or a comma-separated list.
///
/// Parsed from strings like "80", "1-1024", "80,443,8080".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PortSpec {
    /// Explicit list of ports.
    Explicit(Vec<u16>),
    /// Contiguous port range (inclusive).
    Range { start: u16, end: u16 },
}

impl PortSpec {
    /// Parse a port spec string ("80", "1-1024", "80,443,8080").
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty port list".to_string());
        }
        if let Some((a, b)) = s.split_once('-').filter(|_| !s.contains(',')) {
            let start = parse_port(a)?;
            let end = parse_port(b)?;
            if end < start {
                return Err(format!("invalid range: {} > {}", start, end));
            }
            return Ok(Self::Range { start, end });
        }
        let ports: Result<Vec<u16>, _> = s.split(',').map(parse_port).collect();
        Ok(Self::Explicit(ports?))
    }

    /// Expand to a sorted, deduplicated list of port numbers.
    pub fn expand(&self) -> Vec<u16> {
        match self {
            Self::Explicit(ports) => {
                let mut v = ports.clone();
                v.sort_unstable();
                v.dedup();
                v
            }
            Self::Range { start, end } => (*start..=*end).collect(),
        }
    }

    /// First and last port, for specs used as a source-port range.
    pub fn bounds(&self) -> Option<(u16, u16)> {
        let ports = self.expand();
        Some((*ports.first()?, *ports.last()?))
    }
}

fn parse_port(p: &str) -> Result<u16, String> {
    p.trim()
        .parse::<u16>()
        .map_err(|_| format!("invalid port: '{}'", p.trim()))
}

impl std::fmt::Display for PortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(ports) => {
                let s: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", s.join(","))
            }
            Self::Range { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}
