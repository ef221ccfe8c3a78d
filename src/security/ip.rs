//! Private / reserved address classification.
//!
//! IPv4 blocks: 10/8, 127/8, 169.254/16, 172.16/12, 192.168/16,
//! 100.64/10 (CGNAT), 198.18/15 and everything from 224.0.0.0 up.
//! IPv6 blocks: `::`, `::1`, fc00::/7, fe80::/10 and IPv4-mapped
//! (`::ffff:a.b.c.d`) addresses whose embedded IPv4 is itself blocked.
//!
//! Known gap: NAT64 (`64:ff9b::/96`), 6to4 and other transition prefixes
//! are not unwrapped.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returns true when the IPv4 address must not be contacted.
pub fn is_private_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    a == 10
        || a == 127
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
        || (a == 100 && (64..=127).contains(&b))
        || (a == 198 && (b == 18 || b == 19))
        || a >= 224
}

/// Returns true when the IPv6 address must not be contacted.
pub fn is_private_v6(ip: &Ipv6Addr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() {
        return true;
    }
    let first = ip.segments()[0];
    if first & 0xfe00 == 0xfc00 || first & 0xffc0 == 0xfe80 {
        return true;
    }
    match ip.to_ipv4_mapped() {
        Some(v4) => is_private_v4(&v4),
        None => false,
    }
}

pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

/// Classify an address given as text. Anything that does not parse as an
/// IPv4 or IPv6 address is treated as unsafe.
pub fn is_private_ip_str(raw: &str) -> bool {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    match trimmed.parse::<IpAddr>() {
        Ok(ip) => is_private_ip(&ip),
        Err(_) => true,
    }
}
