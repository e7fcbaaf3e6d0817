use crate::error::ScanError;
use crate::types::ProtocolKind;
use std::net::Ipv4Addr;
use std::time::Duration;

pub const DEFAULT_WORKERS: isize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything the engine needs for one run against one host.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Host string as given by the user; only used to label results.
    pub target: String,
    pub ip: Ipv4Addr,
    /// Ascending and deduplicated.
    pub ports: Vec<u16>,
    /// Order is preserved per job. Empty means TCP only.
    pub protocols: Vec<ProtocolKind>,
    /// Values below 1 run a single worker.
    pub workers: isize,
    /// Per-probe deadline, also the service detector's budget.
    pub timeout: Duration,
    pub service_detect: bool,
    pub os_detect: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            ip: Ipv4Addr::UNSPECIFIED,
            ports: Vec::new(),
            protocols: vec![ProtocolKind::Tcp],
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            service_detect: false,
            os_detect: false,
        }
    }
}

impl ScanConfig {
    pub fn new(target: impl Into<String>, ip: Ipv4Addr, ports: Vec<u16>) -> Self {
        Self {
            target: target.into(),
            ip,
            ports,
            ..Self::default()
        }
    }

    /// Rejects configurations that would never produce a result.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.target.trim().is_empty() {
            return Err(ScanError::config("missing target"));
        }
        if self.ip.is_unspecified() {
            return Err(ScanError::config("missing target address"));
        }
        if self.ports.is_empty() {
            return Err(ScanError::config("no ports to scan"));
        }
        Ok(())
    }

    /// `max(workers, 1)`.
    pub fn effective_workers(&self) -> usize {
        coerce_workers(self.workers)
    }
}

pub fn coerce_workers(requested: isize) -> usize {
    requested.max(1) as usize
}

/// Protocol list from the three CLI switches: stealth first, then TCP, then
/// UDP. Nothing selected means TCP.
pub fn protocols_from_flags(tcp: bool, udp: bool, stealth: bool) -> Vec<ProtocolKind> {
    let mut out = Vec::with_capacity(3);
    if stealth {
        out.push(ProtocolKind::Stealth);
    }
    if tcp {
        out.push(ProtocolKind::Tcp);
    }
    if udp {
        out.push(ProtocolKind::Udp);
    }
    if out.is_empty() {
        out.push(ProtocolKind::Tcp);
    }
    out
}
