//! Packet builders shared by unit tests.

use std::net::Ipv4Addr;

use crate::packet::{ETHERTYPE_IPV4, ETHER_HEADER_LEN, IPPROTO_TCP};

pub const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
pub const REMOTE: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

/// Bare IPv4 + TCP reply (20-byte headers, no options, no payload).
pub fn ip_tcp_reply(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, ack: u32, flags: u8) -> Vec<u8> {
    let mut p = vec![0u8; 40];
    p[0] = 0x45;
    p[2..4].copy_from_slice(&40u16.to_be_bytes());
    p[4..6].copy_from_slice(&0x4242u16.to_be_bytes());
    p[6] = 0x40; // DF
    p[8] = 58;
    p[9] = IPPROTO_TCP;
    p[12..16].copy_from_slice(&src.octets());
    p[16..20].copy_from_slice(&dst.octets());
    p[20..22].copy_from_slice(&sport.to_be_bytes());
    p[22..24].copy_from_slice(&dport.to_be_bytes());
    p[24..28].copy_from_slice(&0x1000_0000u32.to_be_bytes());
    p[28..32].copy_from_slice(&ack.to_be_bytes());
    p[32] = 0x50;
    p[33] = flags;
    p[34..36].copy_from_slice(&65535u16.to_be_bytes());
    p
}

/// Ethernet frame wrapping [`ip_tcp_reply`].
pub fn tcp_reply(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, ack: u32, flags: u8) -> Vec<u8> {
    let mut frame = vec![0u8; ETHER_HEADER_LEN];
    frame[0..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    frame[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    frame[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
    frame.extend_from_slice(&ip_tcp_reply(src, dst, sport, dport, ack, flags));
    frame
}
