//! UDP probe with a protocol-aware payload.
//!
//! Port 53 gets a real DNS query so that a resolver actually answers; every
//! other port gets a single zero byte. Any bytes coming back mean `open`,
//! even when the DNS answer fails validation: a middlebox replying with junk
//! is still evidence that something is listening.

use crate::types::{PortResult, ProtocolKind, ScanState};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::debug;

const DNS_PORT: u16 = 53;
const DNS_HEADER_LEN: usize = 12;
const DNS_PROBE_NAME: &str = "example.com";
const DNS_FLAG_QR: u16 = 0x8000;
const DNS_FLAG_RD: u16 = 0x0100;
const QTYPE_A: u16 = 1;
const QCLASS_IN: u16 = 1;
const GENERIC_PAYLOAD: [u8; 1] = [0x00];
const RECV_BUF_LEN: usize = 4096;

pub const DNS_NOT_VALIDATED: &str = "dns response not validated";

/// Datagram sent by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdpPayload {
    /// Standard recursive A query; `txid` must be echoed by a real resolver.
    Dns { txid: u16, query: Vec<u8> },
    Generic,
}

impl UdpPayload {
    pub fn for_port(port: u16) -> Self {
        if port == DNS_PORT {
            Self::dns_query(DNS_PROBE_NAME).unwrap_or(Self::Generic)
        } else {
            Self::Generic
        }
    }

    /// A query for `name` with a random transaction id. `None` if `name`
    /// is not a valid DNS name.
    pub fn dns_query(name: &str) -> Option<Self> {
        let txid: u16 = rand::random();
        let query = build_dns_query(txid, name)?;
        Some(Self::Dns { txid, query })
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Dns { query, .. } => query,
            Self::Generic => &GENERIC_PAYLOAD,
        }
    }
}

/// UDP probe using the payload appropriate for `port`.
pub async fn probe(ip: Ipv4Addr, port: u16, timeout: Duration) -> PortResult {
    probe_with_payload(ip, port, timeout, UdpPayload::for_port(port)).await
}

/// UDP probe with an explicit payload. DNS validation applies whenever the
/// payload is a DNS query, whatever the port.
pub async fn probe_with_payload(
    ip: Ipv4Addr,
    port: u16,
    timeout: Duration,
    payload: UdpPayload,
) -> PortResult {
    let addr = SocketAddrV4::new(ip, port);
    let deadline = Instant::now() + timeout;
    let mut res = PortResult::new(ip, port, ProtocolKind::Udp, ScanState::OpenFiltered);

    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(s) => s,
        Err(e) => return res.with_error(e.to_string()),
    };
    if let Err(e) = socket.connect(addr).await {
        return refused_or_error(res, e);
    }

    let start = Instant::now();
    if let Err(e) = socket.send(payload.bytes()).await {
        return refused_or_error(res, e);
    }

    let mut buf = vec![0u8; RECV_BUF_LEN];
    let remaining = deadline.saturating_duration_since(Instant::now());
    match time::timeout(remaining, socket.recv(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            res.rtt_ms = start.elapsed().as_millis() as u64;
            res.state = ScanState::Open;
            if let UdpPayload::Dns { txid, .. } = &payload {
                if !is_valid_dns_response(&buf[..n], *txid) {
                    res.error = Some(DNS_NOT_VALIDATED.into());
                }
            }
        }
        // Empty datagram: nothing to go on.
        Ok(Ok(_)) => {}
        Ok(Err(e)) => res = refused_or_error(res, e),
        Err(_) => res.error = Some("timeout".into()),
    }

    debug!(%addr, state = %res.state, rtt_ms = res.rtt_ms, error = ?res.error, "udp probe");
    res
}

/// An ICMP port unreachable comes back through a connected datagram socket
/// as `ConnectionRefused`.
fn refused_or_error(mut res: PortResult, e: io::Error) -> PortResult {
    if e.kind() == io::ErrorKind::ConnectionRefused {
        res.state = ScanState::Closed;
        return res;
    }
    res.with_error(e.to_string())
}

fn build_dns_query(txid: u16, name: &str) -> Option<Vec<u8>> {
    let qname = encode_dns_name(name)?;
    let mut out = Vec::with_capacity(DNS_HEADER_LEN + qname.len() + 4);
    out.extend_from_slice(&txid.to_be_bytes());
    out.extend_from_slice(&DNS_FLAG_RD.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    out.extend_from_slice(&[0u8; 6]); // ANCOUNT, NSCOUNT, ARCOUNT
    out.extend_from_slice(&qname);
    out.extend_from_slice(&QTYPE_A.to_be_bytes());
    out.extend_from_slice(&QCLASS_IN.to_be_bytes());
    Some(out)
}

fn encode_dns_name(name: &str) -> Option<Vec<u8>> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() {
        return None;
    }
    let mut out = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return None;
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Some(out)
}

/// Header-length, transaction-id echo and QR bit.
pub fn is_valid_dns_response(pkt: &[u8], want_txid: u16) -> bool {
    if pkt.len() < DNS_HEADER_LEN {
        return false;
    }
    let txid = u16::from_be_bytes([pkt[0], pkt[1]]);
    let flags = u16::from_be_bytes([pkt[2], pkt[3]]);
    txid == want_txid && flags & DNS_FLAG_QR != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_query_layout() {
        let q = build_dns_query(0xBEEF, "example.com").unwrap();
        assert_eq!(&q[0..2], &[0xBE, 0xEF]);
        assert_eq!(&q[2..4], &[0x01, 0x00]);
        assert_eq!(&q[4..6], &[0x00, 0x01]);
        assert_eq!(&q[12..25], b"\x07example\x03com\x00");
        assert_eq!(&q[25..], &[0, 1, 0, 1]);
    }

    #[test]
    fn bad_names_are_rejected() {
        assert!(encode_dns_name("").is_none());
        assert!(encode_dns_name("a..b").is_none());
        assert!(encode_dns_name(&"x".repeat(64)).is_none());
        assert_eq!(encode_dns_name("com.").unwrap(), b"\x03com\x00");
    }

    #[test]
    fn payload_selection_by_port() {
        assert_eq!(UdpPayload::for_port(161), UdpPayload::Generic);
        assert_eq!(UdpPayload::Generic.bytes(), &[0u8]);
        match UdpPayload::for_port(53) {
            UdpPayload::Dns { txid, query } => {
                assert_eq!(u16::from_be_bytes([query[0], query[1]]), txid);
            }
            other => panic!("expected dns payload, got {other:?}"),
        }
    }

    #[test]
    fn dns_response_validation() {
        let mut reply = build_dns_query(0x1234, "example.com").unwrap();
        assert!(!is_valid_dns_response(&reply, 0x1234), "query is not a response");

        reply[2] |= 0x80;
        assert!(is_valid_dns_response(&reply, 0x1234));
        assert!(!is_valid_dns_response(&reply, 0x4321));
        assert!(!is_valid_dns_response(&reply[..11], 0x1234));
    }

    async fn responder(reply: impl Fn(&[u8]) -> Vec<u8> + Send + 'static) -> u16 {
        let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = sock.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            if let Ok((n, peer)) = sock.recv_from(&mut buf).await {
                let _ = sock.send_to(&reply(&buf[..n]), peer).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn dns_reply_with_matching_txid_is_clean_open() {
        let port = responder(|q| {
            let mut r = q.to_vec();
            r[2] |= 0x80;
            r
        })
        .await;
        let payload = UdpPayload::dns_query("example.com").unwrap();
        let r = probe_with_payload(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2), payload).await;
        assert_eq!(r.state, ScanState::Open);
        assert_eq!(r.error, None);
    }

    #[tokio::test]
    async fn dns_reply_with_wrong_txid_is_open_but_annotated() {
        let port = responder(|q| {
            let mut r = q.to_vec();
            r[0] ^= 0xFF;
            r[2] |= 0x80;
            r
        })
        .await;
        let payload = UdpPayload::dns_query("example.com").unwrap();
        let r = probe_with_payload(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2), payload).await;
        assert_eq!(r.state, ScanState::Open);
        assert_eq!(r.error.as_deref(), Some(DNS_NOT_VALIDATED));
    }
}
