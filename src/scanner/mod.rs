//! Probes and the worker pool that drives them.

pub mod manager;
pub mod stealth;
pub mod tcp;
pub mod udp;

pub use manager::{build_jobs, check_privilege, Manager, ResultStream};

use crate::types::{PortResult, ProtocolKind};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Run exactly one probe of the given kind. Always yields a result; probe
/// failures are recorded on it.
pub async fn run_probe(
    protocol: ProtocolKind,
    ip: Ipv4Addr,
    port: u16,
    timeout: Duration,
) -> PortResult {
    match protocol {
        ProtocolKind::Tcp => tcp::probe(ip, port, timeout).await,
        ProtocolKind::Udp => udp::probe(ip, port, timeout).await,
        ProtocolKind::Stealth => stealth::probe(ip, port, timeout).await,
    }
}
