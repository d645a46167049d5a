//! Start-up gateway and interface discovery.
//!
//! The default route is read from the kernel with an rtnetlink
//! `RTM_GETROUTE` dump, falling back to `/proc/net/route` when netlink is
//! unavailable. Interface addresses come from `SIOCGIFADDR` and
//! `/sys/class/net/{iface}/address`. All calls are blocking and one-shot;
//! callers treat failure as fatal.
//!
//! Request building and response parsing are pure functions over byte
//! buffers so they can be tested without a netlink socket.

use std::net::Ipv4Addr;

use crate::packet::{ByteReader, ParseError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("netlink message with {0}-byte payload exceeds the maximum message size")]
    MessageTooLarge(usize),

    #[error("netlink socket error: {0}")]
    Socket(String),

    #[error("netlink returned error code {0}")]
    Netlink(i32),

    #[error("malformed netlink response: {0}")]
    Parse(#[from] ParseError),

    #[error("no default route found")]
    NoDefaultRoute,

    #[error(
        "interface '{requested}' does not match the default gateway's interface '{actual}'; \
         specify the gateway MAC address manually"
    )]
    InterfaceMismatch { requested: String, actual: String },

    #[error("cannot read IPv4 address of '{interface}': {source}")]
    InterfaceAddress {
        interface: String,
        source: std::io::Error,
    },

    #[error("cannot read hardware address of '{interface}': {reason}")]
    HwAddr { interface: String, reason: String },

    #[error("gateway discovery is not supported on this platform")]
    Unsupported,
}

// =============================================================================
// rtnetlink wire format
// =============================================================================

const NLMSG_ALIGNTO: usize = 4;
const NLMSG_HDRLEN: usize = 16;
const RTA_HDRLEN: usize = 4;
const RTMSG_LEN: usize = 12;

const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE: u16 = 3;
pub const RTM_NEWROUTE: u16 = 24;
pub const RTM_GETROUTE: u16 = 26;

const NLM_F_REQUEST: u16 = 0x01;
const NLM_F_MULTI: u16 = 0x02;
const NLM_F_DUMP: u16 = 0x300;

const AF_INET: u8 = 2;
const RT_TABLE_MAIN: u8 = 254;
const RTA_OIF: u16 = 4;
const RTA_GATEWAY: u16 = 5;

/// Round `len` up to the netlink alignment, or `None` on overflow.
fn nl_align(len: usize) -> Option<usize> {
    len.checked_add(NLMSG_ALIGNTO - 1).map(|l| l & !(NLMSG_ALIGNTO - 1))
}

/// Build a dump request: `nlmsghdr` followed by `payload`, padded to
/// alignment. Sizes are checked so an oversized payload is rejected instead
/// of producing a short buffer.
pub fn build_route_request(
    msg_type: u16,
    seq: u32,
    pid: u32,
    payload: &[u8],
) -> Result<Vec<u8>, GatewayError> {
    let too_large = || GatewayError::MessageTooLarge(payload.len());
    let msg_len = payload.len().checked_add(NLMSG_HDRLEN).ok_or_else(too_large)?;
    let space = nl_align(msg_len).ok_or_else(too_large)?;
    let msg_len_u32 = u32::try_from(msg_len).map_err(|_| too_large())?;

    let mut buf = vec![0u8; space];
    buf[0..4].copy_from_slice(&msg_len_u32.to_ne_bytes());
    buf[4..6].copy_from_slice(&msg_type.to_ne_bytes());
    buf[6..8].copy_from_slice(&(NLM_F_REQUEST | NLM_F_DUMP).to_ne_bytes());
    buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    buf[12..16].copy_from_slice(&pid.to_ne_bytes());
    buf[NLMSG_HDRLEN..msg_len].copy_from_slice(payload);
    Ok(buf)
}

/// Zeroed `rtmsg` asking for IPv4 routes.
pub fn route_request_payload() -> [u8; RTMSG_LEN] {
    let mut rt = [0u8; RTMSG_LEN];
    rt[0] = AF_INET;
    rt
}

/// One IPv4 main-table route from a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Destination prefix length (0 for the default route).
    pub dst_len: u8,
    /// Output interface index.
    pub oif: Option<u32>,
    pub gateway: Option<Ipv4Addr>,
}

/// Parsed contents of one `recv` buffer from a route dump.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DumpChunk {
    pub routes: Vec<RouteEntry>,
    /// `NLMSG_DONE` seen, or the message was not part of a multipart reply.
    pub done: bool,
}

/// Parse every netlink message in `buf`.
///
/// Routes outside the IPv4 main table are skipped. An `NLMSG_ERROR` with a
/// non-zero code is returned as [`GatewayError::Netlink`].
pub fn parse_route_dump(buf: &[u8]) -> Result<DumpChunk, GatewayError> {
    let r = ByteReader::new(buf);
    let mut chunk = DumpChunk::default();
    let mut off = 0usize;

    while off < buf.len() {
        let msg_len = r.u32_ne_at(off, "nlmsghdr")? as usize;
        let msg_type = r.u16_ne_at(off + 4, "nlmsghdr")?;
        let flags = r.u16_ne_at(off + 6, "nlmsghdr")?;
        if msg_len < NLMSG_HDRLEN {
            return Err(ParseError::Truncated {
                what: "nlmsghdr length",
                need: NLMSG_HDRLEN,
                have: msg_len,
            }
            .into());
        }
        let body = r.slice(off + NLMSG_HDRLEN, msg_len - NLMSG_HDRLEN, "netlink message")?;

        match msg_type {
            NLMSG_DONE => {
                chunk.done = true;
                return Ok(chunk);
            }
            NLMSG_ERROR => {
                let code = ByteReader::new(body).u32_ne_at(0, "nlmsgerr")? as i32;
                if code != 0 {
                    return Err(GatewayError::Netlink(-code));
                }
            }
            RTM_NEWROUTE => {
                if let Some(route) = parse_rtmsg(body)? {
                    chunk.routes.push(route);
                }
            }
            _ => {}
        }
        if flags & NLM_F_MULTI == 0 {
            chunk.done = true;
        }

        off = match nl_align(msg_len).and_then(|l| off.checked_add(l)) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(chunk)
}

fn parse_rtmsg(body: &[u8]) -> Result<Option<RouteEntry>, ParseError> {
    let r = ByteReader::new(body);
    let family = r.u8_at(0, "rtmsg")?;
    let dst_len = r.u8_at(1, "rtmsg")?;
    let table = r.u8_at(4, "rtmsg")?;
    r.slice(0, RTMSG_LEN, "rtmsg")?;
    if family != AF_INET || table != RT_TABLE_MAIN {
        return Ok(None);
    }

    let mut entry = RouteEntry {
        dst_len,
        oif: None,
        gateway: None,
    };
    let mut off = RTMSG_LEN;
    while off + RTA_HDRLEN <= body.len() {
        let rta_len = r.u16_ne_at(off, "rtattr")? as usize;
        let rta_type = r.u16_ne_at(off + 2, "rtattr")?;
        if rta_len < RTA_HDRLEN {
            break;
        }
        let data = r.slice(off + RTA_HDRLEN, rta_len - RTA_HDRLEN, "rtattr data")?;
        let d = ByteReader::new(data);
        match rta_type {
            RTA_OIF => entry.oif = Some(d.u32_ne_at(0, "RTA_OIF")?),
            RTA_GATEWAY => {
                let b = d.slice(0, 4, "RTA_GATEWAY")?;
                entry.gateway = Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]));
            }
            _ => {}
        }
        off = match nl_align(rta_len) {
            Some(l) => off + l,
            None => break,
        };
    }
    Ok(Some(entry))
}

/// Pick the default route: a gateway route with prefix length 0, else the
/// first route that carries a gateway.
pub fn select_default_route(routes: &[RouteEntry]) -> Option<RouteEntry> {
    routes
        .iter()
        .find(|r| r.dst_len == 0 && r.gateway.is_some())
        .or_else(|| routes.iter().find(|r| r.gateway.is_some()))
        .copied()
}

// =============================================================================
// /proc and /sys parsing
// =============================================================================

/// Parse the default route from `/proc/net/route` content.
///
/// Returns the interface and gateway of the first entry whose Destination is
/// `00000000` and whose flags have both RTF_UP (0x1) and RTF_GATEWAY (0x2).
/// The Gateway column is the kernel's host-order (little-endian) hex value.
pub fn parse_proc_route(content: &str) -> Option<(String, Ipv4Addr)> {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let flags = u32::from_str_radix(fields[3], 16).unwrap_or(0);
        if fields[1] == "00000000" && (flags & 0x3) == 0x3 {
            let gw = u32::from_str_radix(fields[2], 16).ok()?;
            let b = gw.to_le_bytes();
            return Some((fields[0].to_string(), Ipv4Addr::new(b[0], b[1], b[2], b[3])));
        }
    }
    None
}

/// Parse `aa:bb:cc:dd:ee:ff`.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.trim().split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// Hardware address of `iface`.
pub fn interface_hw_addr(iface: &str) -> Result<[u8; 6], GatewayError> {
    let path = format!("/sys/class/net/{iface}/address");
    let content = std::fs::read_to_string(&path).map_err(|e| GatewayError::HwAddr {
        interface: iface.to_string(),
        reason: format!("read {path}: {e}"),
    })?;
    parse_mac(&content).ok_or_else(|| GatewayError::HwAddr {
        interface: iface.to_string(),
        reason: format!("unparseable address '{}'", content.trim()),
    })
}

// =============================================================================
// OS queries
// =============================================================================

#[cfg(target_os = "linux")]
mod sys {
    use std::ffi::{CStr, CString};
    use std::net::Ipv4Addr;

    use super::*;

    const NETLINK_ROUTE: libc::c_int = 0;
    const SIOCGIFADDR: libc::c_ulong = 0x8915;
    const RECV_BUF_LEN: usize = 64_000;

    /// `struct ifreq` with the `ifr_addr` member of the union.
    #[repr(C)]
    struct IfReqAddr {
        name: [libc::c_char; libc::IF_NAMESIZE],
        addr: libc::sockaddr_in,
        _pad: [u8; 8],
    }

    struct Fd(i32);

    impl Drop for Fd {
        fn drop(&mut self) {
            unsafe { libc::close(self.0) };
        }
    }

    fn last_os_error(what: &str) -> GatewayError {
        GatewayError::Socket(format!("{what}: {}", std::io::Error::last_os_error()))
    }

    /// Dump the IPv4 main routing table.
    pub fn dump_routes() -> Result<Vec<RouteEntry>, GatewayError> {
        let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, NETLINK_ROUTE) };
        if fd < 0 {
            return Err(last_os_error("netlink socket"));
        }
        let fd = Fd(fd);

        let timeout = libc::timeval { tv_sec: 2, tv_usec: 0 };
        unsafe {
            libc::setsockopt(
                fd.0,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &timeout as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };

        let pid = std::process::id();
        let req = build_route_request(RTM_GETROUTE, 1, pid, &route_request_payload())?;
        let sent = unsafe { libc::send(fd.0, req.as_ptr() as *const libc::c_void, req.len(), 0) };
        if sent < 0 {
            return Err(last_os_error("netlink send"));
        }

        let mut buf = vec![0u8; RECV_BUF_LEN];
        let mut routes = Vec::new();
        loop {
            let n = unsafe { libc::recv(fd.0, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
            if n <= 0 {
                return Err(last_os_error("netlink recv"));
            }
            let chunk = parse_route_dump(&buf[..n as usize])?;
            routes.extend(chunk.routes);
            if chunk.done {
                return Ok(routes);
            }
        }
    }

    pub fn index_to_name(index: u32) -> Option<String> {
        let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
        let ret = unsafe { libc::if_indextoname(index, buf.as_mut_ptr()) };
        if ret.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Some(name.to_string_lossy().into_owned())
    }

    pub fn interface_ipv4(iface: &str) -> Result<Ipv4Addr, GatewayError> {
        let io_err = |source| GatewayError::InterfaceAddress {
            interface: iface.to_string(),
            source,
        };
        let cname = CString::new(iface)
            .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        let bytes = cname.as_bytes();
        if bytes.len() >= libc::IF_NAMESIZE {
            return Err(io_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "interface name too long",
            )));
        }

        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(io_err(std::io::Error::last_os_error()));
        }
        let fd = Fd(fd);

        let mut req: IfReqAddr = unsafe { std::mem::zeroed() };
        for (dst, src) in req.name.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }
        req.addr.sin_family = libc::AF_INET as libc::sa_family_t;
        let ret = unsafe { libc::ioctl(fd.0, SIOCGIFADDR as _, &mut req as *mut IfReqAddr) };
        if ret < 0 {
            return Err(io_err(std::io::Error::last_os_error()));
        }
        // s_addr is stored in network byte order.
        Ok(Ipv4Addr::from(req.addr.sin_addr.s_addr.to_ne_bytes()))
    }
}

/// Default route via netlink, then `/proc/net/route`.
#[cfg(target_os = "linux")]
fn default_route() -> Result<(String, Ipv4Addr), GatewayError> {
    match sys::dump_routes() {
        Ok(routes) => {
            let route = select_default_route(&routes).ok_or(GatewayError::NoDefaultRoute)?;
            let iface = route.oif.and_then(sys::index_to_name).unwrap_or_default();
            let gw = route.gateway.ok_or(GatewayError::NoDefaultRoute)?;
            Ok((iface, gw))
        }
        Err(e) => {
            tracing::debug!(error = %e, "netlink route dump failed, reading /proc/net/route");
            let content = std::fs::read_to_string("/proc/net/route")
                .map_err(|e| GatewayError::Socket(format!("read /proc/net/route: {e}")))?;
            parse_proc_route(&content).ok_or(GatewayError::NoDefaultRoute)
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn default_route() -> Result<(String, Ipv4Addr), GatewayError> {
    Err(GatewayError::Unsupported)
}

/// Name of the interface that carries the default route.
pub fn default_interface() -> Result<String, GatewayError> {
    let (iface, _) = default_route()?;
    if iface.is_empty() {
        return Err(GatewayError::NoDefaultRoute);
    }
    Ok(iface)
}

/// Default gateway address. Fails if the default route leaves through an
/// interface other than `iface`.
pub fn default_gateway(iface: &str) -> Result<Ipv4Addr, GatewayError> {
    let (actual, gw) = default_route()?;
    check_interface(iface, &actual)?;
    Ok(gw)
}

fn check_interface(requested: &str, actual: &str) -> Result<(), GatewayError> {
    if requested != actual {
        return Err(GatewayError::InterfaceMismatch {
            requested: requested.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Primary IPv4 address of `iface`.
#[cfg(target_os = "linux")]
pub fn interface_ipv4(iface: &str) -> Result<Ipv4Addr, GatewayError> {
    sys::interface_ipv4(iface)
}

#[cfg(not(target_os = "linux"))]
pub fn interface_ipv4(_iface: &str) -> Result<Ipv4Addr, GatewayError> {
    Err(GatewayError::Unsupported)
}

// =============================================================================
// Start-up discovery
// =============================================================================

/// Interface facts resolved once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    pub interface: String,
    pub ipv4: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// `None` for IP-only capture, where the interface may have no link layer.
    pub hw_addr: Option<[u8; 6]>,
}

/// Resolve address, gateway and hardware address of `iface`. Every lookup
/// must succeed; a default route through another interface is an error.
pub fn discover(iface: &str, ip_only: bool) -> Result<NetworkContext, GatewayError> {
    let ipv4 = interface_ipv4(iface)?;
    let gateway = default_gateway(iface)?;
    let hw_addr = if ip_only {
        None
    } else {
        Some(interface_hw_addr(iface)?)
    };
    Ok(NetworkContext {
        interface: iface.to_string(),
        ipv4,
        gateway,
        hw_addr,
    })
}

/// `aa:bb:cc:dd:ee:ff` rendering of a hardware address.
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_unknown_interface_is_error() {
        assert!(discover("nonexistent-if0", false).is_err());
        assert!(discover("nonexistent-if0", true).is_err());
    }

    #[test]
    fn test_format_mac() {
        let mac = parse_mac("02:00:5e:10:00:ff").unwrap();
        assert_eq!(format_mac(&mac), "02:00:5e:10:00:ff");
    }

    fn nlmsg(msg_type: u16, flags: u16, body: &[u8]) -> Vec<u8> {
        let len = NLMSG_HDRLEN + body.len();
        let mut m = vec![0u8; nl_align(len).unwrap()];
        m[0..4].copy_from_slice(&(len as u32).to_ne_bytes());
        m[4..6].copy_from_slice(&msg_type.to_ne_bytes());
        m[6..8].copy_from_slice(&flags.to_ne_bytes());
        m[NLMSG_HDRLEN..len].copy_from_slice(body);
        m
    }

    fn rtattr(ty: u16, data: &[u8]) -> Vec<u8> {
        let len = RTA_HDRLEN + data.len();
        let mut a = vec![0u8; nl_align(len).unwrap()];
        a[0..2].copy_from_slice(&(len as u16).to_ne_bytes());
        a[2..4].copy_from_slice(&ty.to_ne_bytes());
        a[RTA_HDRLEN..len].copy_from_slice(data);
        a
    }

    fn route(family: u8, table: u8, dst_len: u8, oif: u32, gw: Option<[u8; 4]>) -> Vec<u8> {
        let mut body = vec![0u8; RTMSG_LEN];
        body[0] = family;
        body[1] = dst_len;
        body[4] = table;
        body.extend(rtattr(RTA_OIF, &oif.to_ne_bytes()));
        if let Some(gw) = gw {
            body.extend(rtattr(RTA_GATEWAY, &gw));
        }
        nlmsg(RTM_NEWROUTE, NLM_F_MULTI, &body)
    }

    #[test]
    fn test_build_route_request_layout() {
        let req = build_route_request(RTM_GETROUTE, 7, 1234, &route_request_payload()).unwrap();
        assert_eq!(req.len(), 28);
        assert_eq!(u32::from_ne_bytes(req[0..4].try_into().unwrap()), 28);
        assert_eq!(u16::from_ne_bytes([req[4], req[5]]), RTM_GETROUTE);
        assert_eq!(u16::from_ne_bytes([req[6], req[7]]), NLM_F_REQUEST | NLM_F_DUMP);
        assert_eq!(u32::from_ne_bytes(req[8..12].try_into().unwrap()), 7);
        assert_eq!(u32::from_ne_bytes(req[12..16].try_into().unwrap()), 1234);
        assert_eq!(req[16], AF_INET);
    }

    #[test]
    fn test_build_route_request_pads_to_alignment() {
        let req = build_route_request(RTM_GETROUTE, 0, 0, &[1, 2, 3]).unwrap();
        assert_eq!(req.len(), 20);
        assert_eq!(u32::from_ne_bytes(req[0..4].try_into().unwrap()), 19);
    }

    #[test]
    fn test_nl_align_overflow_checked() {
        assert_eq!(nl_align(5), Some(8));
        assert_eq!(nl_align(8), Some(8));
        assert_eq!(nl_align(usize::MAX), None);
    }

    #[test]
    fn test_parse_route_dump_finds_default() {
        let mut buf = route(AF_INET, RT_TABLE_MAIN, 24, 2, None);
        buf.extend(route(AF_INET, RT_TABLE_MAIN, 0, 3, Some([192, 168, 1, 1])));
        buf.extend(route(10, RT_TABLE_MAIN, 0, 3, Some([0, 0, 0, 0]))); // AF_INET6
        buf.extend(route(AF_INET, 255, 0, 1, Some([127, 0, 0, 1]))); // local table
        let chunk = parse_route_dump(&buf).unwrap();
        assert!(!chunk.done);
        assert_eq!(chunk.routes.len(), 2);
        let def = select_default_route(&chunk.routes).unwrap();
        assert_eq!(def.oif, Some(3));
        assert_eq!(def.gateway, Some(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn test_parse_route_dump_done_stops() {
        let mut buf = nlmsg(NLMSG_DONE, NLM_F_MULTI, &[0, 0, 0, 0]);
        buf.extend(route(AF_INET, RT_TABLE_MAIN, 0, 3, Some([10, 0, 0, 1])));
        let chunk = parse_route_dump(&buf).unwrap();
        assert!(chunk.done);
        assert!(chunk.routes.is_empty(), "messages after NLMSG_DONE are ignored");
    }

    #[test]
    fn test_parse_route_dump_error_message() {
        let code = (-13i32).to_ne_bytes(); // EACCES
        let buf = nlmsg(NLMSG_ERROR, 0, &code);
        assert!(matches!(parse_route_dump(&buf), Err(GatewayError::Netlink(13))));
    }

    #[test]
    fn test_parse_route_dump_truncated_is_error_not_panic() {
        let buf = route(AF_INET, RT_TABLE_MAIN, 0, 3, Some([10, 0, 0, 1]));
        for cut in [3, 10, 17, buf.len() - 2] {
            assert!(parse_route_dump(&buf[..cut]).is_err(), "cut at {cut}");
        }
        let mut bad = buf.clone();
        bad[0..4].copy_from_slice(&8u32.to_ne_bytes());
        assert!(parse_route_dump(&bad).is_err(), "nlmsg_len below header size");
    }

    #[test]
    fn test_select_default_route_none() {
        let routes = [RouteEntry {
            dst_len: 24,
            oif: Some(2),
            gateway: None,
        }];
        assert_eq!(select_default_route(&routes), None);
    }

    #[test]
    fn test_parse_proc_route() {
        let content = "Iface\tDestination\tGateway\tFlags\tRefCnt\tUse\tMetric\tMask\n\
                       eth0\t0000A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\n\
                       eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\n";
        assert_eq!(
            parse_proc_route(content),
            Some(("eth0".to_string(), Ipv4Addr::new(192, 168, 1, 1)))
        );
        assert_eq!(parse_proc_route("Iface\tDestination\n"), None);
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(parse_mac("02:42:ac:11:00:02\n"), Some([0x02, 0x42, 0xac, 0x11, 0x00, 0x02]));
        assert_eq!(parse_mac("02:42:ac:11:00"), None);
        assert_eq!(parse_mac("02:42:ac:11:00:02:ff"), None);
        assert_eq!(parse_mac("zz:42:ac:11:00:02"), None);
    }

    #[test]
    fn test_interface_mismatch() {
        assert!(check_interface("eth0", "eth0").is_ok());
        let err = check_interface("eth1", "eth0").unwrap_err();
        assert!(err.to_string().contains("eth1"));
    }

    #[test]
    fn test_hw_addr_missing_interface() {
        assert!(matches!(
            interface_hw_addr("nonexistent-if0"),
            Err(GatewayError::HwAddr { .. })
        ));
    }

    #[test]
    #[ignore] // requires a default route
    fn test_default_interface_live() {
        let iface = default_interface().unwrap();
        assert!(!iface.is_empty());
        default_gateway(&iface).unwrap();
        interface_ipv4(&iface).unwrap();
    }
}
