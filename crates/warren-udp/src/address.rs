//! Bind specifications and `udp-…` address strings.
//!
//! A bind specification is one of `"[host]:port"`, `"host:port"` or a
//! bare `"port"`. IPv6 literals require brackets; a missing or zero port
//! asks the OS to choose. Addresses advertised to the transport layer
//! serialize as `udp-<ip>:<port>` (IPv6 with brackets).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use warren_types::HashCode;

use crate::{Result, UdpError};

/// Prefix of every advertised communicator address.
pub const ADDRESS_PREFIX: &str = "udp-";

/// Parse a bind specification.
///
/// With `disable_v6`, IPv6 hosts are rejected and the wildcard falls back
/// to `0.0.0.0`.
pub fn parse_bind_spec(spec: &str, disable_v6: bool) -> Result<SocketAddr> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(wildcard(0, disable_v6));
    }

    // Bare port: all digits.
    if spec.chars().all(|c| c.is_ascii_digit()) {
        let port: u16 = spec
            .parse()
            .map_err(|_| UdpError::Configuration(format!("port out of range: {spec}")))?;
        return Ok(wildcard(port, disable_v6));
    }

    // "[v6]:port"
    if let Some(rest) = spec.strip_prefix('[') {
        let (host, port) = rest
            .split_once(']')
            .ok_or_else(|| UdpError::Configuration(format!("unterminated bracket: {spec}")))?;
        let port = parse_port_suffix(port)?;
        if disable_v6 {
            return Err(UdpError::Configuration(
                "IPv6 bind address with IPv6 disabled".into(),
            ));
        }
        let ip: Ipv6Addr = host
            .parse()
            .map_err(|_| UdpError::Configuration(format!("bad IPv6 literal: {host}")))?;
        return Ok(SocketAddr::new(IpAddr::V6(ip), port));
    }

    // "host:port" (IPv4 or hostname-less form; "0" means wildcard).
    let (host, port) = spec
        .rsplit_once(':')
        .ok_or_else(|| UdpError::Configuration(format!("missing port: {spec}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| UdpError::Configuration(format!("bad port: {port}")))?;
    if host == "0" {
        return Ok(wildcard(port, disable_v6));
    }
    let ip: Ipv4Addr = host
        .parse()
        .map_err(|_| UdpError::Configuration(format!("bad IPv4 literal: {host}")))?;
    Ok(SocketAddr::new(IpAddr::V4(ip), port))
}

fn parse_port_suffix(s: &str) -> Result<u16> {
    let s = s
        .strip_prefix(':')
        .ok_or_else(|| UdpError::Configuration(format!("missing port after bracket: {s}")))?;
    if s.is_empty() {
        return Ok(0);
    }
    s.parse()
        .map_err(|_| UdpError::Configuration(format!("bad port: {s}")))
}

fn wildcard(port: u16, disable_v6: bool) -> SocketAddr {
    if disable_v6 {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
    }
}

/// The advertised form of a socket address: `udp-<ip>:<port>`.
pub fn address_string(addr: &SocketAddr) -> String {
    format!("{ADDRESS_PREFIX}{addr}")
}

/// Parse an advertised `udp-…` address back to a socket address.
pub fn parse_address_string(s: &str) -> Result<SocketAddr> {
    let rest = s
        .strip_prefix(ADDRESS_PREFIX)
        .ok_or_else(|| UdpError::WireFormat(format!("not a udp address: {s}")))?;
    rest.parse()
        .map_err(|_| UdpError::WireFormat(format!("bad socket address: {rest}")))
}

/// The hash broadcast signatures cover: SHA-512 of the address string.
pub fn address_hash(address: &str) -> HashCode {
    HashCode::digest(address.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_port() {
        let addr = parse_bind_spec("2086", false).expect("parse");
        assert_eq!(addr.port(), 2086);
        assert!(addr.ip().is_unspecified());
        assert!(matches!(addr.ip(), IpAddr::V6(_)));
    }

    #[test]
    fn test_bare_port_v4_fallback() {
        let addr = parse_bind_spec("2086", true).expect("parse");
        assert_eq!(addr, "0.0.0.0:2086".parse().expect("addr"));
    }

    #[test]
    fn test_empty_spec_is_os_chosen() {
        let addr = parse_bind_spec("", false).expect("parse");
        assert_eq!(addr.port(), 0);
    }

    #[test]
    fn test_host_port() {
        let addr = parse_bind_spec("192.0.2.1:2086", false).expect("parse");
        assert_eq!(addr, "192.0.2.1:2086".parse().expect("addr"));
    }

    #[test]
    fn test_wildcard_host_zero() {
        let addr = parse_bind_spec("0:2086", false).expect("parse");
        assert_eq!(addr.port(), 2086);
        assert!(addr.ip().is_unspecified());
    }

    #[test]
    fn test_bracketed_v6() {
        let addr = parse_bind_spec("[2001:db8::1]:2086", false).expect("parse");
        assert_eq!(addr, "[2001:db8::1]:2086".parse().expect("addr"));
    }

    #[test]
    fn test_bracketed_v6_empty_port() {
        let addr = parse_bind_spec("[::1]:", false).expect("parse");
        assert_eq!(addr.port(), 0);
    }

    #[test]
    fn test_unbracketed_v6_rejected() {
        assert!(parse_bind_spec("2001:db8::1:2086", false).is_err());
    }

    #[test]
    fn test_v6_with_v6_disabled_rejected() {
        assert!(parse_bind_spec("[::1]:2086", true).is_err());
    }

    #[test]
    fn test_port_out_of_range() {
        assert!(parse_bind_spec("99999", false).is_err());
    }

    #[test]
    fn test_address_string_roundtrip() {
        let addr: SocketAddr = "192.0.2.7:1234".parse().expect("addr");
        let s = address_string(&addr);
        assert_eq!(s, "udp-192.0.2.7:1234");
        assert_eq!(parse_address_string(&s).expect("parse"), addr);

        let addr6: SocketAddr = "[2001:db8::1]:4433".parse().expect("addr");
        let s6 = address_string(&addr6);
        assert_eq!(s6, "udp-[2001:db8::1]:4433");
        assert_eq!(parse_address_string(&s6).expect("parse"), addr6);
    }

    #[test]
    fn test_parse_address_string_rejects_foreign() {
        assert!(parse_address_string("tcp-1.2.3.4:1").is_err());
    }

    #[test]
    fn test_address_hash_is_stable() {
        let a = address_hash("udp-192.0.2.7:1234");
        let b = address_hash("udp-192.0.2.7:1234");
        assert_eq!(a, b);
        assert_ne!(a, address_hash("udp-192.0.2.7:1235"));
    }
}
