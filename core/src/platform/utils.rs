/// Split a socket address column into host and port.
///
/// Handles the address formats the port tools print:
/// - IPv4: "127.0.0.1:3000" or "*:8080"
/// - IPv6: "\[::1]:3000" or "\[::ffff:127.0.0.1]:8080"
pub fn parse_address(address: &str) -> Option<(&str, u16)> {
    if address.starts_with('[') {
        // IPv6 format: [::1]:3000
        let bracket_end = address.find(']')?;
        let port_str = address[bracket_end + 1..].strip_prefix(':')?;
        let port: u16 = port_str.parse().ok()?;
        Some((&address[..=bracket_end], port))
    } else {
        // IPv4 format: 127.0.0.1:3000 or *:8080
        let last_colon = address.rfind(':')?;
        let port: u16 = address[last_colon + 1..].parse().ok()?;
        let host = &address[..last_colon];
        Some((if host.is_empty() { "*" } else { host }, port))
    }
}

/// Sort ascending and drop duplicates; IPv4 and IPv6 sockets often share a port.
pub fn normalize_ports(mut ports: Vec<u16>) -> Vec<u16> {
    ports.sort_unstable();
    ports.dedup();
    ports
}
