use super::signatures::{match_banner, tls_service, well_known_service};
use super::ServiceDetector;
use crate::types::{Confidence, PortResult, ProtocolKind};
use anyhow::Result;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

const FALLBACK_BUDGET: Duration = Duration::from_secs(1);
const BANNER_MAX: usize = 2048;

/// What the detector managed to pull off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Grabbed {
    Plain(String),
    /// Description of the peer certificate from a TLS handshake.
    Tls(String),
}

/// Default service detector: banner grab plus the signature table.
///
/// - Reuses a banner already present on the result.
/// - Otherwise, for TCP and stealth results, connects and either sends a
///   small protocol nudge (HTTP `HEAD`, SMTP `HELO`) or just listens.
/// - On TLS ports it completes a handshake and reports the certificate.
/// - Falls back to the well-known port name with low confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureServiceDetector;

#[async_trait]
impl ServiceDetector for SignatureServiceDetector {
    async fn detect(&self, mut res: PortResult, budget: Duration) -> PortResult {
        if !res.state.is_open() {
            return res;
        }

        let existing = res
            .banner
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(|b| Grabbed::Plain(b.to_string()));
        let grabbed = match existing {
            Some(g) => Some(g),
            None if res.protocol != ProtocolKind::Udp => grab(res.ip, res.port, budget).await,
            None => None,
        };

        match grabbed {
            Some(Grabbed::Plain(banner)) => {
                if let Some(sig) = match_banner(&banner) {
                    res.service = Some(sig.service.to_string());
                    res.confidence = Some(sig.confidence);
                }
                res.banner = Some(banner);
            }
            Some(Grabbed::Tls(cert)) => {
                res.service = Some(tls_service(res.port).unwrap_or("tls").to_string());
                res.confidence = Some(Confidence::Medium);
                res.banner = Some(cert);
            }
            None => {}
        }

        if res.service.is_none() {
            if let Some(name) = well_known_service(res.port, res.protocol) {
                res.service = Some(name.to_string());
                res.confidence = Some(Confidence::Low);
            }
        }
        res
    }
}

async fn grab(ip: Ipv4Addr, port: u16, budget: Duration) -> Option<Grabbed> {
    let budget = if budget.is_zero() { FALLBACK_BUDGET } else { budget };
    let addr = SocketAddr::from((ip, port));
    match time::timeout(budget, grab_from(addr, ip, port)).await {
        Ok(Ok(grabbed)) => grabbed,
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "service detection failed");
            None
        }
        Err(_) => {
            debug!(%addr, "service detection timed out");
            None
        }
    }
}

async fn grab_from(addr: SocketAddr, ip: Ipv4Addr, port: u16) -> Result<Option<Grabbed>> {
    let stream = TcpStream::connect(addr).await?;
    if tls_service(port).is_some() {
        Ok(tls_certificate(stream, ip).await?.map(Grabbed::Tls))
    } else {
        Ok(plain_banner(stream, port).await?.map(Grabbed::Plain))
    }
}

fn nudge_for_port(port: u16) -> Option<&'static [u8]> {
    match port {
        80 | 8080 | 8000 => Some(&b"HEAD / HTTP/1.0\r\n\r\n"[..]),
        25 => Some(&b"HELO port-prowler\r\n"[..]),
        _ => None,
    }
}

async fn plain_banner(mut stream: TcpStream, port: u16) -> Result<Option<String>> {
    if let Some(nudge) = nudge_for_port(port) {
        stream.write_all(nudge).await?;
    }
    let mut buf = vec![0u8; BANNER_MAX];
    let n = stream.read(&mut buf).await?;
    Ok(clean_banner(&buf[..n]))
}

fn clean_banner(bytes: &[u8]) -> Option<String> {
    let s = String::from_utf8_lossy(bytes);
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Handshake without verification: we want to see the certificate, not
/// trust it.
async fn tls_certificate(stream: TcpStream, ip: Ipv4Addr) -> Result<Option<String>> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    let connector = tokio_native_tls::TlsConnector::from(connector);
    let tls = connector.connect(&ip.to_string(), stream).await?;
    let Some(cert) = tls.get_ref().peer_certificate()? else {
        return Ok(Some("TLS (no peer certificate)".to_string()));
    };
    let der = cert.to_der()?;
    Ok(Some(
        describe_certificate(&der).unwrap_or_else(|| "TLS (unparseable certificate)".to_string()),
    ))
}

fn describe_certificate(der: &[u8]) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    Some(format!(
        "TLS subject: {}; issuer: {}",
        cert.subject(),
        cert.issuer()
    ))
}
