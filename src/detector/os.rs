//! Banner and port-pattern heuristics for a coarse OS family guess.
//!
//! Scoring is a pure fold over results; there is no shared tally.

use super::OsDetector;
use crate::types::{Confidence, PortResult};

const HIGH_THRESHOLD: u32 = 6;
const MEDIUM_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct OsScores {
    windows: u32,
    linux: u32,
    embedded: u32,
}

impl OsScores {
    fn add(self, other: Self) -> Self {
        Self {
            windows: self.windows + other.windows,
            linux: self.linux + other.linux,
            embedded: self.embedded + other.embedded,
        }
    }

    /// Highest non-zero score. Ties go to the earlier family in
    /// windows, linux, embedded order.
    fn best(&self) -> Option<(&'static str, u32)> {
        [
            ("Windows", self.windows),
            ("Linux", self.linux),
            ("embedded", self.embedded),
        ]
        .into_iter()
        .fold(None, |best, (name, score)| match best {
            Some((_, top)) if top >= score => best,
            _ if score > 0 => Some((name, score)),
            _ => best,
        })
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn score(r: &PortResult) -> OsScores {
    let text = format!(
        "{} {}",
        r.banner.as_deref().unwrap_or_default(),
        r.service.as_deref().unwrap_or_default()
    )
    .trim()
    .to_ascii_lowercase();
    let mut s = OsScores::default();

    if contains_any(&text, &["windows", "microsoft", "mssql"]) {
        s.windows += 3;
    }
    if text.contains("rdp") || r.port == 3389 {
        s.windows += 4;
    }
    if contains_any(&text, &["iis", "winhttp"]) {
        s.windows += 2;
    }

    if contains_any(&text, &["linux", "ubuntu", "debian", "centos", "red hat"]) {
        s.linux += 3;
    }
    if text.contains("ssh") {
        s.linux += 2;
    }
    if contains_any(&text, &["nginx", "apache", "http/"]) {
        s.linux += 2;
    }
    if contains_any(&text, &["mysql", "mariadb", "postgres"]) {
        s.linux += 2;
    }

    if contains_any(&text, &["cisco", "ios", "ubnt", "router", "firmware"]) {
        s.embedded += 3;
    }

    match r.port {
        3389 => s.windows += 4,
        135 | 139 | 445 => s.windows += 3,
        22 | 80 | 443 | 3306 | 5432 => s.linux += 1,
        1900 | 5000 => s.embedded += 1,
        _ => {}
    }
    s
}

fn confidence_for(score: u32) -> Confidence {
    if score >= HIGH_THRESHOLD {
        Confidence::High
    } else if score >= MEDIUM_THRESHOLD {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Fold every open result into one `(os, confidence)` guess. Results that
/// are not open carry no evidence and are skipped.
pub fn guess_os<'a, I>(results: I) -> Option<(String, Confidence)>
where
    I: IntoIterator<Item = &'a PortResult>,
{
    let total = results
        .into_iter()
        .filter(|r| r.state.is_open())
        .map(score)
        .fold(OsScores::default(), OsScores::add);
    let (name, top) = total.best()?;
    Some((name.to_string(), confidence_for(top)))
}

/// Per-result hook used by the workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicOsDetector;

impl OsDetector for HeuristicOsDetector {
    fn detect(&self, result: &PortResult) -> Option<(String, Confidence)> {
        guess_os(std::iter::once(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProtocolKind, ScanState};
    use std::net::Ipv4Addr;

    fn open(port: u16, banner: Option<&str>, service: Option<&str>) -> PortResult {
        let mut r = PortResult::new(Ipv4Addr::LOCALHOST, port, ProtocolKind::Tcp, ScanState::Open);
        r.banner = banner.map(str::to_string);
        r.service = service.map(str::to_string);
        r
    }

    #[test]
    fn rdp_port_alone_is_high_confidence_windows() {
        // banner-or-port rule (+4) plus the port pattern (+4)
        let g = guess_os([&open(3389, None, None)]).unwrap();
        assert_eq!(g, ("Windows".to_string(), Confidence::High));
    }

    #[test]
    fn ubuntu_ssh_banner_is_linux() {
        let r = open(22, Some("SSH-2.0-OpenSSH_9.6p1 Ubuntu-3ubuntu13"), Some("ssh"));
        // linux +3, ssh +2, port 22 +1
        assert_eq!(guess_os([&r]), Some(("Linux".to_string(), Confidence::High)));
    }

    #[test]
    fn weak_evidence_is_low() {
        let g = guess_os([&open(5000, None, None)]).unwrap();
        assert_eq!(g, ("embedded".to_string(), Confidence::Low));
    }

    #[test]
    fn no_evidence_no_guess() {
        assert_eq!(guess_os([&open(40000, None, None)]), None);
        assert_eq!(guess_os(std::iter::empty()), None);
    }

    #[test]
    fn closed_results_are_ignored() {
        let mut r = open(445, None, None);
        r.state = ScanState::Closed;
        assert_eq!(guess_os([&r]), None);
    }

    #[test]
    fn fold_accumulates_across_results() {
        let results = vec![open(80, None, None), open(443, None, None), open(3306, None, None)];
        // three +1 linux port hints
        assert_eq!(guess_os(&results), Some(("Linux".to_string(), Confidence::Medium)));
    }

    #[test]
    fn ties_prefer_windows_then_linux() {
        let s = OsScores { windows: 3, linux: 3, embedded: 3 };
        assert_eq!(s.best(), Some(("Windows", 3)));
        let s = OsScores { windows: 0, linux: 2, embedded: 2 };
        assert_eq!(s.best(), Some(("Linux", 2)));
        assert_eq!(OsScores::default().best(), None);
    }

    #[test]
    fn per_result_detector_matches_fold() {
        let r = open(445, Some("Microsoft Windows SMB"), None);
        assert_eq!(HeuristicOsDetector.detect(&r), guess_os([&r]));
    }
}
