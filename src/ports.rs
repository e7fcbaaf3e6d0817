use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;

/// Parse a port specification into an ascending, deduplicated list of ports (1..=65535).
///
/// Supported forms, freely mixed and comma separated:
/// - single port: `22`
/// - inclusive range: `8000-8100`
/// - whitespace around tokens is ignored, empty tokens are not
pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>> {
    let spec = spec.trim();
    if spec.is_empty() {
        bail!("empty port spec");
    }

    let mut seen = BTreeSet::new();
    for (idx, raw) in spec.split(',').enumerate() {
        let token_no = idx + 1;
        let token = raw.trim();
        if token.is_empty() {
            bail!("token {token_no}: empty token in port spec");
        }

        // Range `start-end`
        if let Some((a, b)) = token.split_once('-') {
            let start = parse_port_str(a.trim())
                .with_context(|| format!("token {token_no}: invalid start in range: {a}"))?;
            let end = parse_port_str(b.trim())
                .with_context(|| format!("token {token_no}: invalid end in range: {b}"))?;
            if start > end {
                bail!("token {token_no}: invalid range {start}-{end} (start > end)");
            }
            seen.extend(start..=end);
            continue;
        }

        let p = parse_port_str(token)
            .with_context(|| format!("token {token_no}: invalid port value: {token}"))?;
        seen.insert(p);
    }

    Ok(seen.into_iter().collect())
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_ports_sorted() {
        assert_eq!(parse_port_spec("80,22").unwrap(), vec![22, 80]);
        assert_eq!(parse_port_spec(" 443 ").unwrap(), vec![443]);
    }

    #[test]
    fn parse_ranges_and_dedup() {
        let ports = parse_port_spec("8000-8002,80,8001").unwrap();
        assert_eq!(ports, vec![80, 8000, 8001, 8002]);
    }

    #[test]
    fn full_range_edges() {
        let ports = parse_port_spec("65534-65535,1").unwrap();
        assert_eq!(ports, vec![1, 65534, 65535]);
    }

    #[test]
    fn invalid_values_error() {
        for spec in ["", "0", "65536", "10-1", "abc", "22,", "1-70000", "-5"] {
            assert!(parse_port_spec(spec).is_err(), "expected error for {spec:?}");
        }
    }
}
