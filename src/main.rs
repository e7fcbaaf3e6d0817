use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use port_prowler_rs::config::{protocols_from_flags, ScanConfig};
use port_prowler_rs::detector::guess_os;
use port_prowler_rs::types::{Confidence, PortResult, ScanReport, ScanState};
use port_prowler_rs::{logging, output, ports, resolver, Manager, ScanError};

const EXIT_USAGE: u8 = 2;
const EXIT_PRIVILEGE: u8 = 3;
const EXIT_FAILURE: u8 = 4;

/// port-prowler-rs: probe one host's ports over TCP, UDP or raw SYN.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-prowler-rs",
    version,
    about = "Probe one host's ports over TCP connect, UDP or raw SYN, with optional service and OS detection.",
    long_about = None
)]
struct Cli {
    /// Hostname or IPv4 address to scan.
    target: String,

    /// Ports to scan, e.g. 22,80,8000-8100.
    #[arg(short = 'p', long)]
    ports: String,

    /// TCP connect probe (default when no protocol is selected).
    #[arg(long, default_value_t = false)]
    tcp: bool,

    /// UDP probe.
    #[arg(long, default_value_t = false)]
    udp: bool,

    /// Raw SYN probe. Needs root or CAP_NET_RAW.
    #[arg(short = 's', long, default_value_t = false)]
    stealth: bool,

    /// Number of concurrent workers.
    #[arg(
        short = 'c',
        long,
        default_value_t = 100,
        value_parser = clap::value_parser!(i64).range(1..=10000)
    )]
    workers: i64,

    /// Per-probe timeout in milliseconds.
    #[arg(short = 't', long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Grab banners and name services on open ports.
    #[arg(long = "service-detect", default_value_t = false)]
    service_detect: bool,

    /// Guess the remote OS family from open ports and banners.
    #[arg(long = "os-detect", default_value_t = false)]
    os_detect: bool,

    /// Write the rendered output to this path instead of stdout.
    #[arg(short = 'f', long)]
    output: Option<PathBuf>,

    /// Render a JSON report instead of the table.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: {e}");
    }

    let port_list = match ports::parse_port_spec(&cli.ports) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: invalid port spec: {e:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match run(cli, port_list).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<ScanError>() {
            Some(se) if se.is_privilege_required() => {
                eprintln!("Error: {se}");
                ExitCode::from(EXIT_PRIVILEGE)
            }
            _ => {
                eprintln!("Error: {e:#}");
                ExitCode::from(EXIT_FAILURE)
            }
        },
    }
}

async fn run(cli: Cli, port_list: Vec<u16>) -> Result<()> {
    let ip = resolver::resolve_ipv4(&cli.target).await?;
    if !cli.json {
        println!("Target: {} -> {}", cli.target, ip);
    }

    let cfg = ScanConfig {
        protocols: protocols_from_flags(cli.tcp, cli.udp, cli.stealth),
        workers: isize::try_from(cli.workers).unwrap_or(isize::MAX),
        timeout: Duration::from_millis(cli.timeout_ms),
        service_detect: cli.service_detect,
        os_detect: cli.os_detect,
        ..ScanConfig::new(cli.target.clone(), ip, port_list)
    };
    info!(?cfg, "scan configuration");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping scan");
                cancel.cancel();
            }
        });
    }

    let started_at = output::now_rfc3339();
    let mut stream = Manager::new(cfg).run(cancel.clone())?;
    let mut results = Vec::new();
    while let Some(r) = stream.recv().await {
        results.push(r);
    }
    let finished_at = output::now_rfc3339();

    let os = if cli.os_detect { guess_os(&results) } else { None };

    let rendered = if cli.json {
        let report = ScanReport {
            target: cli.target.clone(),
            ip,
            started_at,
            finished_at,
            os_guess: os.as_ref().map(|(g, _)| g.clone()),
            os_confidence: os.as_ref().map(|(_, c)| *c),
            results,
        };
        output::render_json(&report)? + "\n"
    } else {
        let mut text = String::new();
        text.push_str(&os_line(cli.os_detect, os.as_ref()));
        text.push_str(&summary_lines(&results, cancel.is_cancelled()));
        text.push('\n');
        text.push_str(&output::render_table(&mut results));
        text
    };

    match cli.output.as_deref() {
        Some(path) => {
            output::write_atomic(path, rendered.as_bytes())
                .with_context(|| format!("writing results to {}", path.display()))?;
            eprintln!("Wrote results to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn os_line(enabled: bool, os: Option<&(String, Confidence)>) -> String {
    match (enabled, os) {
        (false, _) => "OS: disabled\n".to_string(),
        (true, None) => "OS: unknown\n".to_string(),
        (true, Some((guess, confidence))) => format!("OS: {guess} (confidence: {confidence})\n"),
    }
}

fn summary_lines(results: &[PortResult], cancelled: bool) -> String {
    let count = |s: ScanState| results.iter().filter(|r| r.state == s).count();
    let mut out = format!(
        "Results: {} (open: {}, closed: {}, filtered: {}, open|filtered: {})\n",
        results.len(),
        count(ScanState::Open),
        count(ScanState::Closed),
        count(ScanState::Filtered),
        count(ScanState::OpenFiltered),
    );
    if cancelled {
        out.push_str("Scan interrupted; results are partial.\n");
    }
    out
}
