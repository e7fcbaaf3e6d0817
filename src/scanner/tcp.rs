use crate::types::{PortResult, ProtocolKind, ScanState};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

/// Raw result of a bounded connect attempt, before classification.
#[derive(Debug)]
pub(crate) enum ConnectOutcome {
    Connected,
    TimedOut,
    Failed(io::Error),
}

/// TCP connect probe.
///
/// - Bounds the handshake with `tokio::time::timeout`.
/// - Drops the stream as soon as the handshake completes; banners are the
///   service detector's business.
/// - RTT covers attempt start to outcome, whatever the outcome.
pub async fn probe(ip: Ipv4Addr, port: u16, timeout: Duration) -> PortResult {
    let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));
    let start = Instant::now();
    let outcome = match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            ConnectOutcome::Connected
        }
        Ok(Err(e)) => ConnectOutcome::Failed(e),
        Err(_) => ConnectOutcome::TimedOut,
    };
    let mut res = classify(ip, port, outcome);
    res.rtt_ms = start.elapsed().as_millis() as u64;
    debug!(%addr, state = %res.state, rtt_ms = res.rtt_ms, error = ?res.error, "tcp probe");
    res
}

pub(crate) fn classify(ip: Ipv4Addr, port: u16, outcome: ConnectOutcome) -> PortResult {
    let mut res = PortResult::new(ip, port, ProtocolKind::Tcp, ScanState::Filtered);
    match outcome {
        ConnectOutcome::Connected => res.state = ScanState::Open,
        ConnectOutcome::TimedOut => res.error = Some("timeout".into()),
        ConnectOutcome::Failed(e) => match e.kind() {
            io::ErrorKind::ConnectionRefused => res.state = ScanState::Closed,
            io::ErrorKind::TimedOut => res.error = Some("timeout".into()),
            _ => res.error = Some(e.to_string()),
        },
    }
    res
}
