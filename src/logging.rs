//! Tracing subscriber setup for the binary.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: warnings by default, one more
/// level per `-v`.
pub fn default_directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("port_prowler_rs={level}")
}

/// Install a stderr fmt subscriber. `RUST_LOG` takes precedence over the
/// verbosity count.
pub fn init(verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(default_directive(0), "port_prowler_rs=warn");
        assert_eq!(default_directive(1), "port_prowler_rs=info");
        assert_eq!(default_directive(2), "port_prowler_rs=debug");
        assert_eq!(default_directive(9), "port_prowler_rs=trace");
    }
}
