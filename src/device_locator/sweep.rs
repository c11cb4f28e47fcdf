//! Subnet sweep primitives: CIDR expansion, liveness probes, reverse names.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Ports tried during a liveness probe. Any answer counts; payloads are
/// never read.
const PROBE_PORTS: [u16; 4] = [80, 554, 443, 8080];

/// Parse CIDR notation to IP list
pub fn parse_cidr(cidr: &str) -> Result<Vec<IpAddr>> {
    // Handle single IP
    if !cidr.contains('/') {
        return cidr
            .parse::<IpAddr>()
            .map(|ip| vec![ip])
            .map_err(|e| Error::Parse(format!("Invalid IP: {}", e)));
    }

    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(Error::Parse(format!("Invalid CIDR format: {}", cidr)));
    }

    let base_ip: Ipv4Addr = parts[0]
        .parse()
        .map_err(|e| Error::Parse(format!("Invalid IP: {}", e)))?;
    let prefix: u8 = parts[1]
        .parse()
        .map_err(|e| Error::Parse(format!("Invalid prefix: {}", e)))?;

    if prefix > 32 {
        return Err(Error::Parse(format!(
            "Invalid prefix: {} (must be 0-32)",
            prefix
        )));
    }

    let base_u32 = u32::from(base_ip);
    let mask = if prefix == 0 {
        0
    } else {
        !((1u32 << (32 - prefix)) - 1)
    };
    let network = base_u32 & mask;
    let broadcast = network | !mask;

    // Skip network and broadcast addresses for /24 and smaller
    let mut ips = Vec::new();
    let start = if prefix >= 24 { network + 1 } else { network };
    let end = if prefix >= 24 { broadcast - 1 } else { broadcast };

    for ip_u32 in start..=end {
        ips.push(IpAddr::V4(Ipv4Addr::from(ip_u32)));
    }

    Ok(ips)
}

/// Liveness probe via TCP connect. A completed connect or an active
/// refusal both mean the host is up; only silence is down.
pub async fn probe_host(ip: IpAddr, timeout_ms: u32) -> bool {
    let timeout_dur = Duration::from_millis(timeout_ms as u64);

    for port in PROBE_PORTS {
        let addr = SocketAddr::new(ip, port);
        match timeout(timeout_dur, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => return true,
            // Refused = alive, port closed
            Ok(Err(_)) => return true,
            // Timeout, try next port
            Err(_) => continue,
        }
    }

    false
}

/// Reverse-resolve an address to its PTR name.
pub async fn reverse_hostname(ip: IpAddr) -> Option<String> {
    let result = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip)).await;
    match result {
        Ok(Ok(name)) => Some(name),
        Ok(Err(_)) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Reverse lookup task failed");
            None
        }
    }
}

/// Strip the trailing dot and the final domain label.
/// "cam-3.lan." becomes "cam-3"; single-label names pass through.
pub fn clean_hostname(name: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    match trimmed.rsplit_once('.') {
        Some((head, _suffix)) => head.to_string(),
        None => trimmed.to_string(),
    }
}

/// The /24 of every routable local IPv4 interface.
pub async fn local_interface_subnets() -> Vec<String> {
    let output = match Command::new("ip")
        .args(["-4", "addr", "show"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!(error = %e, "ip addr enumeration failed");
            return Vec::new();
        }
    };

    parse_interface_subnets(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `ip -4 addr show` output into /24 subnets, skipping loopback and
/// virtual interfaces.
pub fn parse_interface_subnets(output: &str) -> Vec<String> {
    let mut subnets = Vec::new();
    let mut current_iface = String::new();

    for line in output.lines() {
        if !line.starts_with(' ') {
            // "2: enp2s0: <BROADCAST,...>"
            if let Some(name) = line.splitn(3, ':').nth(1) {
                current_iface = name.trim().to_string();
            }
            continue;
        }
        if is_virtual_interface(&current_iface) {
            continue;
        }

        // "    inet 192.168.1.246/24 brd 192.168.1.255 scope global ..."
        let Some(rest) = line.trim_start().strip_prefix("inet ") else {
            continue;
        };
        let Some(addr) = rest.split_whitespace().next() else {
            continue;
        };
        let Some(ip_str) = addr.split('/').next() else {
            continue;
        };
        let Ok(ip) = ip_str.parse::<Ipv4Addr>() else {
            continue;
        };
        if ip.is_loopback() {
            continue;
        }

        let octets = ip.octets();
        let subnet = format!("{}.{}.{}.0/24", octets[0], octets[1], octets[2]);
        if !subnets.contains(&subnet) {
            subnets.push(subnet);
        }
    }

    subnets
}

fn is_virtual_interface(name: &str) -> bool {
    name == "lo"
        || name.starts_with("docker")
        || name.starts_with("br-")
        || name.starts_with("veth")
        || name.starts_with("virbr")
}

// ============================================================
// Tests
// ============================================================
