//! Checked header views over captured packet bytes.
//!
//! Every field access goes through [`ByteReader`], which validates the
//! offset against the buffer length and returns a [`ParseError`] on
//! truncation. Nothing here assumes the caller pre-validated sizes.

use std::net::Ipv4Addr;

/// Ethernet II header length.
pub const ETHER_HEADER_LEN: usize = 14;
/// EtherType for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// Minimum IPv4 header length (IHL=5).
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// Minimum TCP header length (data offset=5).
pub const TCP_MIN_HEADER_LEN: usize = 20;
/// UDP header length.
pub const UDP_HEADER_LEN: usize = 8;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// "More fragments" bit in the IPv4 flags/fragment-offset word.
const IP_MF: u16 = 0x2000;

/// Errors from header parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("truncated {what}: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        need: usize,
        have: usize,
    },

    #[error("invalid IPv4 header length: {0} bytes")]
    BadHeaderLength(usize),
}

// ─────────────────────────────────────────────────────────────────────────────
// Byte reader
// ─────────────────────────────────────────────────────────────────────────────

/// Bounds-checked reader over a byte slice.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize, what: &'static str) -> Result<&'a [u8], ParseError> {
        let end = offset.checked_add(len).ok_or(ParseError::Truncated {
            what,
            need: usize::MAX,
            have: self.buf.len(),
        })?;
        self.buf.get(offset..end).ok_or(ParseError::Truncated {
            what,
            need: end,
            have: self.buf.len(),
        })
    }

    /// Borrow everything from `offset` to the end of the buffer.
    pub fn rest(&self, offset: usize, what: &'static str) -> Result<&'a [u8], ParseError> {
        self.buf.get(offset..).ok_or(ParseError::Truncated {
            what,
            need: offset,
            have: self.buf.len(),
        })
    }

    pub fn u8_at(&self, offset: usize, what: &'static str) -> Result<u8, ParseError> {
        Ok(self.slice(offset, 1, what)?[0])
    }

    pub fn u16_be_at(&self, offset: usize, what: &'static str) -> Result<u16, ParseError> {
        let b = self.slice(offset, 2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32_be_at(&self, offset: usize, what: &'static str) -> Result<u32, ParseError> {
        let b = self.slice(offset, 4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Host-endian u16 (netlink headers are in host byte order).
    pub fn u16_ne_at(&self, offset: usize, what: &'static str) -> Result<u16, ParseError> {
        let b = self.slice(offset, 2, what)?;
        Ok(u16::from_ne_bytes([b[0], b[1]]))
    }

    /// Host-endian u32.
    pub fn u32_ne_at(&self, offset: usize, what: &'static str) -> Result<u32, ParseError> {
        let b = self.slice(offset, 4, what)?;
        Ok(u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IPv4
// ─────────────────────────────────────────────────────────────────────────────

/// View over an IPv4 packet (header plus whatever payload was captured).
///
/// Construction only requires the fixed 20-byte header. The IHL-derived
/// header length is validated lazily by [`Ipv4Header::payload`], so a packet
/// with garbage options still reaches validation and is counted there.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header<'a> {
    reader: ByteReader<'a>,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        if bytes.len() < IPV4_MIN_HEADER_LEN {
            return Err(ParseError::Truncated {
                what: "IPv4 header",
                need: IPV4_MIN_HEADER_LEN,
                have: bytes.len(),
            });
        }
        Ok(Self {
            reader: ByteReader::new(bytes),
        })
    }

    /// Raw bytes from the start of the IP header to the end of the capture.
    pub fn bytes(&self) -> &'a [u8] {
        self.reader.buf
    }

    fn fixed_u8(&self, offset: usize) -> u8 {
        self.reader.buf[offset]
    }

    fn fixed_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.reader.buf[offset], self.reader.buf[offset + 1]])
    }

    fn fixed_addr(&self, offset: usize) -> Ipv4Addr {
        let b = &self.reader.buf[offset..offset + 4];
        Ipv4Addr::new(b[0], b[1], b[2], b[3])
    }

    pub fn version(&self) -> u8 {
        self.fixed_u8(0) >> 4
    }

    /// Header length in bytes as declared by IHL.
    pub fn header_len(&self) -> usize {
        ((self.fixed_u8(0) & 0x0f) as usize) * 4
    }

    pub fn total_len(&self) -> u16 {
        self.fixed_u16(2)
    }

    pub fn id(&self) -> u16 {
        self.fixed_u16(4)
    }

    pub fn more_fragments(&self) -> bool {
        self.fixed_u16(6) & IP_MF != 0
    }

    pub fn ttl(&self) -> u8 {
        self.fixed_u8(8)
    }

    pub fn protocol(&self) -> u8 {
        self.fixed_u8(9)
    }

    pub fn src(&self) -> Ipv4Addr {
        self.fixed_addr(12)
    }

    pub fn dst(&self) -> Ipv4Addr {
        self.fixed_addr(16)
    }

    /// Transport payload following the (possibly option-bearing) header.
    pub fn payload(&self) -> Result<&'a [u8], ParseError> {
        let hl = self.header_len();
        if hl < IPV4_MIN_HEADER_LEN {
            return Err(ParseError::BadHeaderLength(hl));
        }
        self.reader.rest(hl, "IPv4 options")
    }
}

/// Source port of the transport header, when the protocol carries one and
/// the captured bytes are long enough to hold the full header.
pub fn transport_src_port(ip: &Ipv4Header<'_>) -> Option<u16> {
    let payload = ip.payload().ok()?;
    match ip.protocol() {
        IPPROTO_TCP => TcpHeader::parse(payload).ok().map(|t| t.src_port()),
        IPPROTO_UDP => UdpHeader::parse(payload).ok().map(|u| u.src_port()),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TCP / UDP
// ─────────────────────────────────────────────────────────────────────────────

pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_ACK: u8 = 0x10;

/// View over a TCP header.
#[derive(Debug, Clone, Copy)]
pub struct TcpHeader<'a> {
    bytes: &'a [u8],
}

impl<'a> TcpHeader<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        if bytes.len() < TCP_MIN_HEADER_LEN {
            return Err(ParseError::Truncated {
                what: "TCP header",
                need: TCP_MIN_HEADER_LEN,
                have: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    fn u16_at(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    fn u32_at(&self, offset: usize) -> u32 {
        u32::from_be_bytes([
            self.bytes[offset],
            self.bytes[offset + 1],
            self.bytes[offset + 2],
            self.bytes[offset + 3],
        ])
    }

    pub fn src_port(&self) -> u16 {
        self.u16_at(0)
    }

    pub fn dst_port(&self) -> u16 {
        self.u16_at(2)
    }

    pub fn seq(&self) -> u32 {
        self.u32_at(4)
    }

    pub fn ack(&self) -> u32 {
        self.u32_at(8)
    }

    pub fn flags(&self) -> u8 {
        self.bytes[13]
    }

    pub fn window(&self) -> u16 {
        self.u16_at(14)
    }
}

/// View over a UDP header.
#[derive(Debug, Clone, Copy)]
pub struct UdpHeader<'a> {
    bytes: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        if bytes.len() < UDP_HEADER_LEN {
            return Err(ParseError::Truncated {
                what: "UDP header",
                need: UDP_HEADER_LEN,
                have: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthetic link layer
// ─────────────────────────────────────────────────────────────────────────────

/// Scratch buffer that prefixes a zeroed Ethernet header to bare IP packets.
///
/// Probe modules always parse a full frame. In IP-only capture mode there is
/// no link layer, so the receive loop wraps each packet in this buffer before
/// handing it over. Input longer than the buffer is truncated.
pub struct SyntheticLink {
    buf: Box<[u8]>,
}

impl SyntheticLink {
    /// Total buffer size, header included.
    pub const CAPACITY: usize = 65535;

    pub fn new() -> Self {
        let mut buf = vec![0u8; Self::CAPACITY].into_boxed_slice();
        buf[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        Self { buf }
    }

    /// Copy `ip` behind the fake header and return the resulting frame.
    pub fn wrap(&mut self, ip: &[u8]) -> &[u8] {
        let available = Self::CAPACITY - ETHER_HEADER_LEN;
        let n = ip.len().min(available);
        self.buf[ETHER_HEADER_LEN..ETHER_HEADER_LEN + n].copy_from_slice(&ip[..n]);
        &self.buf[..ETHER_HEADER_LEN + n]
    }
}

impl Default for SyntheticLink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip_tcp_bytes() -> Vec<u8> {
        let mut p = vec![0u8; 40];
        p[0] = 0x45;
        p[2..4].copy_from_slice(&40u16.to_be_bytes());
        p[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
        p[8] = 57;
        p[9] = IPPROTO_TCP;
        p[12..16].copy_from_slice(&[93, 184, 216, 34]);
        p[16..20].copy_from_slice(&[10, 0, 0, 5]);
        p[20..22].copy_from_slice(&443u16.to_be_bytes());
        p[22..24].copy_from_slice(&40000u16.to_be_bytes());
        p[32] = 0x50;
        p[33] = TCP_SYN | TCP_ACK;
        p
    }

    #[test]
    fn test_ipv4_header_fields() {
        let bytes = ip_tcp_bytes();
        let ip = Ipv4Header::parse(&bytes).unwrap();
        assert_eq!(ip.version(), 4);
        assert_eq!(ip.header_len(), 20);
        assert_eq!(ip.total_len(), 40);
        assert_eq!(ip.id(), 0x1234);
        assert_eq!(ip.ttl(), 57);
        assert_eq!(ip.protocol(), IPPROTO_TCP);
        assert_eq!(ip.src(), Ipv4Addr::new(93, 184, 216, 34));
        assert_eq!(ip.dst(), Ipv4Addr::new(10, 0, 0, 5));
        assert!(!ip.more_fragments());
    }

    #[test]
    fn test_ipv4_parse_rejects_short_buffer() {
        let err = Ipv4Header::parse(&[0x45; 19]).unwrap_err();
        assert_eq!(
            err,
            ParseError::Truncated {
                what: "IPv4 header",
                need: 20,
                have: 19
            }
        );
    }

    #[test]
    fn test_more_fragments_flag() {
        let mut bytes = ip_tcp_bytes();
        bytes[6] = 0x20;
        let ip = Ipv4Header::parse(&bytes).unwrap();
        assert!(ip.more_fragments());
    }

    #[test]
    fn test_payload_rejects_ihl_below_minimum() {
        let mut bytes = ip_tcp_bytes();
        bytes[0] = 0x43;
        let ip = Ipv4Header::parse(&bytes).unwrap();
        assert_eq!(ip.payload().unwrap_err(), ParseError::BadHeaderLength(12));
    }

    #[test]
    fn test_payload_rejects_ihl_past_end() {
        let mut bytes = ip_tcp_bytes();
        bytes.truncate(24);
        bytes[0] = 0x4f; // 60-byte header declared, 24 captured
        let ip = Ipv4Header::parse(&bytes).unwrap();
        assert!(ip.payload().is_err());
    }

    #[test]
    fn test_transport_src_port_tcp() {
        let bytes = ip_tcp_bytes();
        let ip = Ipv4Header::parse(&bytes).unwrap();
        assert_eq!(transport_src_port(&ip), Some(443));
    }

    #[test]
    fn test_transport_src_port_truncated_tcp_is_none() {
        let bytes = ip_tcp_bytes();
        let ip = Ipv4Header::parse(&bytes[..30]).unwrap();
        assert_eq!(transport_src_port(&ip), None);
    }

    #[test]
    fn test_transport_src_port_udp() {
        let mut bytes = ip_tcp_bytes();
        bytes.truncate(28);
        bytes[9] = IPPROTO_UDP;
        bytes[20..22].copy_from_slice(&53u16.to_be_bytes());
        let ip = Ipv4Header::parse(&bytes).unwrap();
        assert_eq!(transport_src_port(&ip), Some(53));
    }

    #[test]
    fn test_transport_src_port_icmp_is_none() {
        let mut bytes = ip_tcp_bytes();
        bytes[9] = IPPROTO_ICMP;
        let ip = Ipv4Header::parse(&bytes).unwrap();
        assert_eq!(transport_src_port(&ip), None);
    }

    #[test]
    fn test_tcp_header_fields() {
        let mut seg = [0u8; 20];
        seg[0..2].copy_from_slice(&80u16.to_be_bytes());
        seg[2..4].copy_from_slice(&50000u16.to_be_bytes());
        seg[4..8].copy_from_slice(&0xdeadbeefu32.to_be_bytes());
        seg[8..12].copy_from_slice(&0x01020304u32.to_be_bytes());
        seg[13] = TCP_RST;
        seg[14..16].copy_from_slice(&29200u16.to_be_bytes());
        let tcp = TcpHeader::parse(&seg).unwrap();
        assert_eq!(tcp.src_port(), 80);
        assert_eq!(tcp.dst_port(), 50000);
        assert_eq!(tcp.seq(), 0xdeadbeef);
        assert_eq!(tcp.ack(), 0x01020304);
        assert_eq!(tcp.flags(), TCP_RST);
        assert_eq!(tcp.window(), 29200);
    }

    #[test]
    fn test_byte_reader_out_of_range() {
        let r = ByteReader::new(&[1, 2, 3]);
        assert_eq!(r.u8_at(2, "x").unwrap(), 3);
        assert!(r.u16_be_at(2, "x").is_err());
        assert!(r.u32_be_at(0, "x").is_err());
        assert!(r.slice(usize::MAX, 2, "x").is_err(), "offset overflow must not panic");
    }

    #[test]
    fn test_synthetic_link_header_and_copy() {
        let mut link = SyntheticLink::new();
        let ip = ip_tcp_bytes();
        let frame = link.wrap(&ip);
        assert_eq!(frame.len(), ETHER_HEADER_LEN + ip.len());
        assert_eq!(&frame[0..12], &[0u8; 12], "MAC addresses must be zeroed");
        assert_eq!(u16::from_be_bytes([frame[12], frame[13]]), ETHERTYPE_IPV4);
        assert_eq!(&frame[ETHER_HEADER_LEN..], &ip[..]);
    }

    #[test]
    fn test_synthetic_link_truncates_oversized_input() {
        let mut link = SyntheticLink::new();
        let big = vec![0xabu8; SyntheticLink::CAPACITY + 100];
        let frame = link.wrap(&big);
        assert_eq!(frame.len(), SyntheticLink::CAPACITY);
    }
}
