//! Probe modules: protocol-specific reply validation and field extraction.
//!
//! One module is active per scan. The receive pipeline is protocol-agnostic
//! and hands every captured reply to the module twice: once to decide
//! whether it is a genuine reply ([`ProbeModule::validate_packet`]) and,
//! if so, once to populate the module's fields ([`ProbeModule::process_packet`]).

pub mod tcp_synscan;

use std::any::Any;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};

use crate::fieldset::{FieldDef, Fieldset, FieldsetError};
use crate::packet::{Ipv4Header, ParseError};
use crate::validate::ValidationToken;

pub use tcp_synscan::TcpSynProbe;

/// Errors a probe module may return from [`ProbeModule::process_packet`].
///
/// The receive loop counts these and drops the packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("malformed reply: {0}")]
    Parse(#[from] ParseError),

    #[error("field write failed: {0}")]
    Field(#[from] FieldsetError),
}

/// Protocol-specific half of the receive pipeline.
pub trait ProbeModule: Send {
    /// Short module name, e.g. `"tcp_synscan"`.
    fn name(&self) -> &'static str;

    /// Fields this module populates. Must include a bool or int `success`
    /// field and may include `app_success`.
    fn fields(&self) -> &[FieldDef];

    /// Decide whether `ip` is a reply to one of our probes.
    ///
    /// `token` was computed from the packet's `(dst, src, src_port)`.
    /// Modules whose replies quote the original probe (e.g. ICMP errors)
    /// may rewrite `src` to the address that was actually probed; the
    /// rewritten address is used for deduplication.
    fn validate_packet(
        &self,
        ip: &Ipv4Header<'_>,
        src: &mut Ipv4Addr,
        token: &ValidationToken,
        target_ports: &PortSet,
    ) -> bool;

    /// Populate module fields from a validated reply.
    ///
    /// `frame` always starts with a 14-byte Ethernet header (synthesized
    /// when the capture carries bare IP packets).
    fn process_packet(
        &self,
        frame: &[u8],
        fs: &mut Fieldset<'_>,
        token: &ValidationToken,
        ts: DateTime<Utc>,
    ) -> Result<(), ProbeError>;

    /// Return `self` as `&dyn Any` to enable safe downcasting in tests.
    fn as_any(&self) -> &dyn Any;
}

const PORT_WORDS: usize = (u16::MAX as usize + 1) / 64;

/// Probed destination ports as a 65536-bit set, built once per scan.
/// An empty port list admits any port.
#[derive(Debug, Clone)]
pub struct PortSet {
    bits: Box<[u64; PORT_WORDS]>,
    any: bool,
}

impl PortSet {
    pub fn new(ports: &[u16]) -> Self {
        let mut bits = Box::new([0u64; PORT_WORDS]);
        for &port in ports {
            bits[usize::from(port) / 64] |= 1u64 << (port % 64);
        }
        Self {
            bits,
            any: ports.is_empty(),
        }
    }

    /// Whether `port` is one of the probed ports.
    pub fn contains(&self, port: u16) -> bool {
        self.any || self.bits[usize::from(port) / 64] & (1u64 << (port % 64)) != 0
    }
}
