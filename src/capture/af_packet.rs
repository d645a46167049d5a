//! AF_PACKET capture (Linux).
//!
//! Opens a `SOCK_RAW` packet socket bound to one interface, or `SOCK_DGRAM`
//! with `ETH_P_IP` in IP-only mode so the kernel strips the link header.
//! Outgoing frames (our own probes) are skipped. Requires `CAP_NET_RAW`.

use std::any::Any;
use std::ffi::CString;
use std::ops::ControlFlow;

use chrono::{DateTime, Utc};

use super::{CaptureError, CaptureSource, CaptureStats};

/// Largest frame we copy out of the socket.
const SNAPLEN: usize = 65536;
/// Upper bound on `recvfrom` calls per `poll`.
const MAX_BATCH: usize = 1024;

// =============================================================================
// Linux packet socket constants and structs (not in libc crate)
// =============================================================================

const SOL_PACKET: libc::c_int = 263;
const PACKET_STATISTICS: libc::c_int = 6;
const PACKET_OUTGOING: u8 = 4;
const ETH_P_ALL: u16 = 0x0003;
const ETH_P_IP: u16 = 0x0800;

/// `struct tpacket_stats` from `<linux/if_packet.h>`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct TpacketStats {
    tp_packets: u32,
    tp_drops: u32,
}

/// AF_PACKET capture bound to a single interface.
pub struct AfPacketCapture {
    interface: String,
    ip_only: bool,
    fd: i32,
    buf: Vec<u8>,
    received: u64,
    dropped: u64,
    rx_dropped_at_init: Option<u64>,
}

impl AfPacketCapture {
    pub fn new(interface: impl Into<String>, ip_only: bool) -> Self {
        Self {
            interface: interface.into(),
            ip_only,
            fd: -1,
            buf: vec![0u8; SNAPLEN],
            received: 0,
            dropped: 0,
            rx_dropped_at_init: None,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Bytes of link-layer header in captured buffers.
    pub fn link_header_len(&self) -> usize {
        if self.ip_only {
            0
        } else {
            crate::packet::ETHER_HEADER_LEN
        }
    }

    fn ifindex(&self) -> Result<i32, CaptureError> {
        let name = CString::new(self.interface.as_str())
            .map_err(|_| CaptureError::InterfaceNotFound(self.interface.clone()))?;
        let idx = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if idx == 0 {
            return Err(CaptureError::InterfaceNotFound(self.interface.clone()));
        }
        Ok(idx as i32)
    }

    /// Interface-level receive drops from sysfs.
    fn read_rx_dropped(&self) -> Option<u64> {
        let path = format!("/sys/class/net/{}/statistics/rx_dropped", self.interface);
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    /// Fold the kernel's since-last-read socket counters into our totals.
    fn refresh_socket_stats(&mut self) {
        if self.fd < 0 {
            return;
        }
        let mut st = TpacketStats::default();
        let mut len = std::mem::size_of::<TpacketStats>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                self.fd,
                SOL_PACKET,
                PACKET_STATISTICS,
                &mut st as *mut TpacketStats as *mut libc::c_void,
                &mut len,
            )
        };
        if ret == 0 {
            self.received += st.tp_packets as u64;
            self.dropped += st.tp_drops as u64;
        }
    }

    fn close(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
            self.fd = -1;
        }
    }
}

impl Drop for AfPacketCapture {
    fn drop(&mut self) {
        self.close();
    }
}

impl CaptureSource for AfPacketCapture {
    fn init(&mut self) -> Result<(), CaptureError> {
        let ifindex = self.ifindex()?;
        let (sock_type, proto) = if self.ip_only {
            (libc::SOCK_DGRAM, ETH_P_IP)
        } else {
            (libc::SOCK_RAW, ETH_P_ALL)
        };

        let fd = unsafe { libc::socket(libc::AF_PACKET, sock_type, proto.to_be() as libc::c_int) };
        if fd < 0 {
            return Err(CaptureError::Socket(format!(
                "AF_PACKET socket creation failed (requires CAP_NET_RAW): {}",
                std::io::Error::last_os_error()
            )));
        }

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = proto.to_be();
        addr.sll_ifindex = ifindex;
        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let source = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(CaptureError::Bind {
                interface: self.interface.clone(),
                source,
            });
        }

        self.fd = fd;
        // Discard counters accumulated between socket() and bind().
        self.refresh_socket_stats();
        self.received = 0;
        self.dropped = 0;
        self.rx_dropped_at_init = self.read_rx_dropped();

        tracing::info!(
            interface = %self.interface,
            ifindex,
            ip_only = self.ip_only,
            "AF_PACKET capture opened"
        );
        Ok(())
    }

    fn poll(
        &mut self,
        timeout_ms: u64,
        on_packet: &mut dyn FnMut(&[u8], DateTime<Utc>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        if self.fd < 0 {
            return ControlFlow::Continue(());
        }
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout = timeout_ms.min(i32::MAX as u64) as i32;
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout) };
        if ret <= 0 {
            return ControlFlow::Continue(());
        }

        for _ in 0..MAX_BATCH {
            let mut from: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
            let mut from_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
            let n = unsafe {
                libc::recvfrom(
                    self.fd,
                    self.buf.as_mut_ptr() as *mut libc::c_void,
                    self.buf.len(),
                    libc::MSG_DONTWAIT,
                    &mut from as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                    &mut from_len,
                )
            };
            if n < 0 {
                // EAGAIN ends the batch; anything else is retried on the next poll.
                break;
            }
            if from.sll_pkttype == PACKET_OUTGOING {
                continue;
            }
            let len = (n as usize).min(self.buf.len());
            if on_packet(&self.buf[..len], Utc::now()).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn stats(&mut self) -> CaptureStats {
        self.refresh_socket_stats();
        let if_dropped = match (self.rx_dropped_at_init, self.read_rx_dropped()) {
            (Some(start), Some(now)) => now.saturating_sub(start),
            _ => 0,
        };
        CaptureStats {
            received: self.received,
            dropped: self.dropped,
            if_dropped,
        }
    }

    fn cleanup(&mut self) {
        if self.fd >= 0 {
            self.refresh_socket_stats();
            self.close();
            tracing::info!(
                interface = %self.interface,
                received = self.received,
                dropped = self.dropped,
                "AF_PACKET capture closed"
            );
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_header_len() {
        assert_eq!(AfPacketCapture::new("eth0", false).link_header_len(), 14);
        assert_eq!(AfPacketCapture::new("eth0", true).link_header_len(), 0);
    }

    #[test]
    fn test_unknown_interface_rejected() {
        let mut cap = AfPacketCapture::new("nonexistent-if0", false);
        assert!(matches!(cap.init(), Err(CaptureError::InterfaceNotFound(_))));
    }

    fn count_polled(cap: &mut AfPacketCapture, timeout_ms: u64) -> usize {
        let mut n = 0;
        let _ = cap.poll(timeout_ms, &mut |_: &[u8], _: DateTime<Utc>| {
            n += 1;
            ControlFlow::Continue(())
        });
        n
    }

    #[test]
    fn test_poll_before_init_is_empty() {
        let mut cap = AfPacketCapture::new("lo", false);
        assert_eq!(count_polled(&mut cap, 0), 0);
        assert_eq!(cap.stats().received, 0);
    }

    #[test]
    fn test_capture_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AfPacketCapture>();
    }

    #[test]
    #[ignore] // requires CAP_NET_RAW
    fn test_open_loopback() {
        let mut cap = AfPacketCapture::new("lo", false);
        cap.init().unwrap();
        let _ = count_polled(&mut cap, 10);
        cap.cleanup();
        assert_eq!(count_polled(&mut cap, 0), 0);
    }
}
