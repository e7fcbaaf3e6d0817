use crate::types::{Confidence, ProtocolKind};

/// Case-insensitive banner substring and the service it identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub needle: &'static str,
    pub service: &'static str,
    pub confidence: Confidence,
}

/// Checked in order; the first hit wins.
pub const SIGNATURES: &[Signature] = &[
    Signature { needle: "ssh-", service: "ssh", confidence: Confidence::High },
    Signature { needle: "http/", service: "http", confidence: Confidence::Medium },
    Signature { needle: "nginx", service: "http/nginx", confidence: Confidence::High },
    Signature { needle: "220 ", service: "smtp", confidence: Confidence::Medium },
    Signature { needle: "dns", service: "dns", confidence: Confidence::Medium },
];

pub fn match_banner(banner: &str) -> Option<&'static Signature> {
    if banner.is_empty() {
        return None;
    }
    let lower = banner.to_ascii_lowercase();
    SIGNATURES.iter().find(|s| lower.contains(s.needle))
}

/// Ports where the detector speaks TLS before anything else.
pub fn tls_service(port: u16) -> Option<&'static str> {
    match port {
        443 | 8443 => Some("https"),
        465 => Some("smtps"),
        993 => Some("imaps"),
        995 => Some("pop3s"),
        _ => None,
    }
}

/// IANA-style default name for a port, used when nothing better is known.
pub fn well_known_service(port: u16, protocol: ProtocolKind) -> Option<&'static str> {
    let name = match (protocol, port) {
        (ProtocolKind::Udp, 53) => "dns",
        (ProtocolKind::Udp, 67 | 68) => "dhcp",
        (ProtocolKind::Udp, 69) => "tftp",
        (ProtocolKind::Udp, 123) => "ntp",
        (ProtocolKind::Udp, 137) => "netbios-ns",
        (ProtocolKind::Udp, 161) => "snmp",
        (ProtocolKind::Udp, 500) => "isakmp",
        (ProtocolKind::Udp, 514) => "syslog",
        (ProtocolKind::Udp, 1900) => "ssdp",
        (ProtocolKind::Udp, 5353) => "mdns",
        (ProtocolKind::Udp, _) => return None,
        (_, 21) => "ftp",
        (_, 22) => "ssh",
        (_, 23) => "telnet",
        (_, 25) => "smtp",
        (_, 53) => "dns",
        (_, 80 | 8000 | 8080) => "http",
        (_, 110) => "pop3",
        (_, 135) => "msrpc",
        (_, 139) => "netbios-ssn",
        (_, 143) => "imap",
        (_, 445) => "microsoft-ds",
        (_, 3306) => "mysql",
        (_, 3389) => "rdp",
        (_, 5432) => "postgresql",
        (_, 5900) => "vnc",
        (_, 6379) => "redis",
        (_, p) => return tls_service(p),
    };
    Some(name)
}
