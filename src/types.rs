use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Probe technique applied to a port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Tcp,
    Udp,
    Stealth,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Tcp => "tcp",
            ProtocolKind::Udp => "udp",
            ProtocolKind::Stealth => "stealth",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(ProtocolKind::Tcp),
            "udp" => Ok(ProtocolKind::Udp),
            "stealth" | "syn" => Ok(ProtocolKind::Stealth),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// Reachability classification of one (port, protocol) pair.
///
/// `OpenFiltered` only ever comes out of the UDP probe: silence there cannot
/// tell an open service that ignores the payload from a dropped datagram.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "filtered")]
    Filtered,
    #[serde(rename = "open|filtered")]
    OpenFiltered,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Open => "open",
            ScanState::Closed => "closed",
            ScanState::Filtered => "filtered",
            ScanState::OpenFiltered => "open|filtered",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ScanState::Open)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        })
    }
}

/// One port's worth of work. Built once by the job builder and handed to
/// exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortJob {
    pub target: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    /// Executed strictly in this order.
    pub protocols: Vec<ProtocolKind>,
}

/// Outcome of a single probe against one (port, protocol) pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub target: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub protocol: ProtocolKind,
    pub state: ScanState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_guess: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rtt_ms: u64,
}

impl PortResult {
    /// A blank result with the given best-effort state. The target label is
    /// filled in by the worker from the job.
    pub fn new(ip: Ipv4Addr, port: u16, protocol: ProtocolKind, state: ScanState) -> Self {
        Self {
            target: String::new(),
            ip,
            port,
            protocol,
            state,
            service: None,
            banner: None,
            os_guess: None,
            confidence: None,
            error: None,
            rtt_ms: 0,
        }
    }

    pub fn with_error(mut self, err: impl Into<String>) -> Self {
        self.error = Some(err.into());
        self
    }
}

/// Whole-run report written by the binary in JSON mode.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub target: String,
    pub ip: Ipv4Addr,
    pub started_at: String,
    pub finished_at: String,
    pub os_guess: Option<String>,
    pub os_confidence: Option<Confidence>,
    pub results: Vec<PortResult>,
}
