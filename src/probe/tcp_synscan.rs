//! TCP SYN probe: classifies SYN-ACK (open) and RST (closed) replies.
//!
//! The sender puts token word 0 in the SYN's sequence number, so a genuine
//! SYN-ACK acknowledges `word0 + 1`. RSTs from some stacks echo the sequence
//! number unchanged, so `word0` is also accepted for them.

use std::any::Any;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};

use super::{PortSet, ProbeError, ProbeModule};
use crate::fieldset::{FieldDef, FieldType, Fieldset};
use crate::packet::{Ipv4Header, TcpHeader, ETHER_HEADER_LEN, IPPROTO_TCP, TCP_ACK, TCP_RST, TCP_SYN};
use crate::validate::ValidationToken;

const FIELDS: &[FieldDef] = &[
    FieldDef::new("sport", FieldType::Int, "TCP source port"),
    FieldDef::new("dport", FieldType::Int, "TCP destination port"),
    FieldDef::new("seqnum", FieldType::Int, "TCP sequence number"),
    FieldDef::new("acknum", FieldType::Int, "TCP acknowledgement number"),
    FieldDef::new("window", FieldType::Int, "TCP window"),
    FieldDef::new("classification", FieldType::String, "packet classification"),
    FieldDef::new("success", FieldType::Bool, "is response considered success"),
];

/// Reply classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynReply {
    /// SYN-ACK received: port is open.
    SynAck,
    /// RST received: port is closed.
    Rst,
}

impl SynReply {
    pub fn from_flags(flags: u8) -> Self {
        if flags & TCP_RST != 0 {
            Self::Rst
        } else {
            Self::SynAck
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SynAck => "synack",
            Self::Rst => "rst",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::SynAck)
    }
}

/// SYN scan probe module.
#[derive(Debug, Clone)]
pub struct TcpSynProbe {
    source_ports: RangeInclusive<u16>,
}

impl TcpSynProbe {
    /// `first..=last` is the source-port range the sender draws from; replies
    /// must be addressed to a port inside it.
    pub fn new(first: u16, last: u16) -> Self {
        let (lo, hi) = if first <= last { (first, last) } else { (last, first) };
        Self {
            source_ports: lo..=hi,
        }
    }

    pub fn source_ports(&self) -> &RangeInclusive<u16> {
        &self.source_ports
    }
}

impl ProbeModule for TcpSynProbe {
    fn name(&self) -> &'static str {
        "tcp_synscan"
    }

    fn fields(&self) -> &[FieldDef] {
        FIELDS
    }

    fn validate_packet(
        &self,
        ip: &Ipv4Header<'_>,
        _src: &mut Ipv4Addr,
        token: &ValidationToken,
        target_ports: &PortSet,
    ) -> bool {
        if ip.protocol() != IPPROTO_TCP {
            return false;
        }
        let Ok(payload) = ip.payload() else {
            return false;
        };
        let Ok(tcp) = TcpHeader::parse(payload) else {
            return false;
        };
        if !target_ports.contains(tcp.src_port()) {
            return false;
        }
        if !self.source_ports.contains(&tcp.dst_port()) {
            return false;
        }

        let expected = token.word(0);
        let flags = tcp.flags();
        if flags & TCP_RST != 0 {
            tcp.ack() == expected || tcp.ack() == expected.wrapping_add(1)
        } else {
            flags & (TCP_SYN | TCP_ACK) == (TCP_SYN | TCP_ACK) && tcp.ack() == expected.wrapping_add(1)
        }
    }

    fn process_packet(
        &self,
        frame: &[u8],
        fs: &mut Fieldset<'_>,
        _token: &ValidationToken,
        _ts: DateTime<Utc>,
    ) -> Result<(), ProbeError> {
        let ip_bytes = frame.get(ETHER_HEADER_LEN..).unwrap_or_default();
        let ip = Ipv4Header::parse(ip_bytes)?;
        let tcp = TcpHeader::parse(ip.payload()?)?;
        let reply = SynReply::from_flags(tcp.flags());

        fs.set_int("sport", tcp.src_port() as u64)?;
        fs.set_int("dport", tcp.dst_port() as u64)?;
        fs.set_int("seqnum", tcp.seq() as u64)?;
        fs.set_int("acknum", tcp.ack() as u64)?;
        fs.set_int("window", tcp.window() as u64)?;
        fs.set_str("classification", reply.as_str())?;
        fs.set_bool("success", reply.is_success())?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
