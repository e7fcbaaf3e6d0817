//! Run-level failures. Anything that goes wrong inside a single probe is
//! recorded on its `PortResult` instead and never shows up here.

use std::io;

/// Reasons a scan refuses to start.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid scan configuration: {0}")]
    Config(String),

    /// Stealth was requested but the privilege gate said no. Kept apart from
    /// `Config` so callers can give it a dedicated exit path.
    #[error("stealth scan requires raw socket privileges: {reason}")]
    PrivilegeRequired { reason: String },
}

impl ScanError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn privilege_required(reason: impl Into<String>) -> Self {
        Self::PrivilegeRequired {
            reason: reason.into(),
        }
    }

    pub fn is_privilege_required(&self) -> bool {
        matches!(self, Self::PrivilegeRequired { .. })
    }
}

/// Why the privilege gate could not answer yes.
#[derive(Debug, thiserror::Error)]
pub enum PrivilegeError {
    #[error("raw sockets are not supported on this platform")]
    Unsupported,

    #[error("failed to inspect process capabilities: {0}")]
    Inspect(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_error_is_distinguishable() {
        let e = ScanError::privilege_required("not root");
        assert!(e.is_privilege_required());
        assert!(e.to_string().contains("raw socket privileges"));
        assert!(!ScanError::config("no ports").is_privilege_required());
    }
}
