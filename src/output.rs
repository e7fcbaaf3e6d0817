//! Rendering and persistence of scan results.

use crate::types::{PortResult, ScanReport};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use time::format_description::well_known;
use time::OffsetDateTime;

const INFO_MAX: usize = 60;

/// Protocol name, then port, then ip, then service.
pub fn sort_results(results: &mut [PortResult]) {
    results.sort_by(|a, b| {
        a.protocol
            .as_str()
            .cmp(b.protocol.as_str())
            .then(a.port.cmp(&b.port))
            .then(a.ip.cmp(&b.ip))
            .then_with(|| a.service.cmp(&b.service))
    });
}

fn info_column(r: &PortResult) -> String {
    let mut info = match &r.error {
        Some(e) => e.clone(),
        None => format!("rtt={}ms", r.rtt_ms),
    };
    if info.len() > INFO_MAX {
        let mut cut = INFO_MAX;
        while !info.is_char_boundary(cut) {
            cut -= 1;
        }
        info.truncate(cut);
    }
    info
}

/// Fixed-width text table, sorted in place first.
pub fn render_table(results: &mut [PortResult]) -> String {
    sort_results(results);

    let rows: Vec<[String; 6]> = results
        .iter()
        .map(|r| {
            [
                r.target.clone(),
                r.ip.to_string(),
                format!("{}/{}", r.port, r.protocol),
                r.state.to_string(),
                r.service.clone().unwrap_or_else(|| "-".to_string()),
                info_column(r),
            ]
        })
        .collect();

    let headers = ["TARGET", "IP", "PORT/PROTO", "STATE", "SERVICE", "INFO"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &headers.map(String::from), &widths);
    push_row(&mut out, &widths.map(|w| "-".repeat(w)), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(c, w)| format!("{c:<w$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

pub fn render_json(report: &ScanReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("serialising scan report")
}

/// Replace `path` with `data` in one step: write a sibling temp file, fsync
/// it, then rename it over the destination. On failure the destination is
/// left as it was.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating directory {}", dir.display()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".port-prowler-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(data).context("writing temp file")?;
    tmp.as_file().sync_all().context("syncing temp file")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// RFC 3339 UTC timestamp.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
