use anyhow::{anyhow, bail, Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Resolve a target (IPv4 literal or hostname) to a single IPv4 address.
///
/// IPv4 literals are returned as-is without touching the resolver. IPv6
/// literals are rejected. For hostnames the first A record wins; a host
/// that only has AAAA records is an error.
pub async fn resolve_ipv4(target: &str) -> Result<Ipv4Addr> {
    let target = target.trim();
    if target.is_empty() {
        bail!("empty target");
    }

    if let Ok(ip) = target.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => bail!("IPv6 addresses are not supported"),
        };
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((target, 0))
        .await
        .with_context(|| format!("failed to resolve {target}"))?
        .collect();
    first_ipv4(&addrs).ok_or_else(|| {
        if addrs.is_empty() {
            anyhow!("no A records found for {target}")
        } else {
            anyhow!("{target} resolves only to IPv6 addresses; IPv6 is not supported")
        }
    })
}

fn first_ipv4(addrs: &[SocketAddr]) -> Option<Ipv4Addr> {
    addrs.iter().find_map(|a| match a.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn first_ipv4_skips_v6() {
        let addrs = vec![
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 0),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 0),
        ];
        assert_eq!(first_ipv4(&addrs), Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(first_ipv4(&addrs[..1]), None);
    }
}
