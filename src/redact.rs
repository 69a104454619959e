use ipnet::{Ipv4Net, Ipv6Net};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Prefix length disclosed for IPv4 addresses.
pub const IPV4_PREFIX_LEN: u8 = 24;
/// Prefix length disclosed for IPv6 addresses.
pub const IPV6_PREFIX_LEN: u8 = 48;

/// Reduce an IPv4 address to its /24 network, e.g. `203.0.113.45` becomes `203.0.113.0`.
///
/// Four dot-separated parts that do not parse as an address (`203.0.113.045`)
/// keep their first three parts verbatim. Anything else is returned unchanged.
pub fn redact_ipv4(address: &str) -> String {
    let trimmed = address.trim();
    if let Ok(ip) = trimmed.parse::<Ipv4Addr>() {
        return ipv4_to_prefix(ip).network().to_string();
    }
    let parts: Vec<&str> = trimmed.split('.').collect();
    match parts.as_slice() {
        [a, b, c, _] => format!("{a}.{b}.{c}.0"),
        _ => address.to_string(),
    }
}

/// Reduce an IPv6 address to its /48 network, e.g. `2001:db8:1234:5678::1` becomes `2001:db8:1234::`.
///
/// Compressed forms are expanded before truncation, so `2001:db8::1` yields `2001:db8::`.
/// Unparseable input is returned unchanged.
pub fn redact_ipv6(address: &str) -> String {
    let trimmed = address.trim();
    match trimmed.parse::<Ipv6Addr>() {
        Ok(ip) => ipv6_to_prefix(ip).network().to_string(),
        Err(_) => address.to_string(),
    }
}

/// The /24 network containing `ip`.
pub fn ipv4_to_prefix(ip: Ipv4Addr) -> Ipv4Net {
    Ipv4Net::new(ip, IPV4_PREFIX_LEN)
        .map(|n| n.trunc())
        .unwrap_or_else(|_| Ipv4Net::from(ip))
}

/// The /48 network containing `ip`.
pub fn ipv6_to_prefix(ip: Ipv6Addr) -> Ipv6Net {
    Ipv6Net::new(ip, IPV6_PREFIX_LEN)
        .map(|n| n.trunc())
        .unwrap_or_else(|_| Ipv6Net::from(ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_keeps_first_three_octets() {
        assert_eq!(redact_ipv4("203.0.113.45"), "203.0.113.0");
        assert_eq!(redact_ipv4("10.1.2.3"), "10.1.2.0");
    }

    #[test]
    fn ipv6_keeps_first_three_groups() {
        assert_eq!(redact_ipv6("2001:db8:1234:5678::1"), "2001:db8:1234::");
        assert_eq!(
            redact_ipv6("2a02:26f0:fe:1a8:abcd:ef01:2345:6789"),
            "2a02:26f0:fe::"
        );
    }

    #[test]
    fn ipv6_compressed_input_is_expanded_first() {
        assert_eq!(redact_ipv6("2001:db8::1"), "2001:db8::");
    }

    #[test]
    fn malformed_input_is_returned_unchanged() {
        assert_eq!(redact_ipv4("not-an-ip"), "not-an-ip");
        assert_eq!(redact_ipv4("1.2.3"), "1.2.3");
        assert_eq!(redact_ipv4(""), "");
        assert_eq!(redact_ipv6("fe80"), "fe80");
        assert_eq!(redact_ipv6("203.0.113.45"), "203.0.113.45");
    }

    #[test]
    fn four_part_non_address_keeps_three_parts() {
        assert_eq!(redact_ipv4("203.0.113.045"), "203.0.113.0");
        assert_eq!(redact_ipv4("10.0.0.999"), "10.0.0.0");
        assert_eq!(redact_ipv4("1.2.3.4.5"), "1.2.3.4.5");
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        assert_eq!(redact_ipv4(" 198.51.100.7\n"), "198.51.100.0");
    }
}
