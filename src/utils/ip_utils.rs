use std::net::Ipv4Addr;

/// IP utility functions for validation and subnet grouping

/// Check if a string is a valid dotted-decimal IPv4 address
pub fn is_valid_ipv4(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

/// Return the network part of an address: the first three dotted octets.
///
/// This is a textual grouping, not a netmask computation, so it also works on
/// strings that are not strictly valid addresses (missing parts are kept as-is).
///
/// # Examples
/// ```
/// use sbasim::utils::ip_utils::network_prefix;
///
/// assert_eq!(network_prefix("192.168.1.10"), "192.168.1");
/// assert_eq!(network_prefix("10.0.0"), "10.0.0");
/// ```
pub fn network_prefix(ip: &str) -> String {
    ip.split('.').take(3).collect::<Vec<_>>().join(".")
}

/// Check if two addresses are in the same subnet (first three octets match)
pub fn same_subnet(ip_a: &str, ip_b: &str) -> bool {
    network_prefix(ip_a) == network_prefix(ip_b)
}

/// Format the /24 CIDR notation for the subnet of an address
pub fn subnet_cidr(ip: &str) -> String {
    format!("{}.0/24", network_prefix(ip))
}

/// Check if a subnet prefix such as "192.168.1" is three valid octets
pub fn is_valid_subnet_prefix(prefix: &str) -> bool {
    let parts: Vec<&str> = prefix.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.parse::<u8>().is_ok())
}
