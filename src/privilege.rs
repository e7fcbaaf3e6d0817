//! Raw-socket privilege check guarding the stealth probe.
//!
//! The check never opens a socket and never touches the network: it only
//! inspects the process credentials.

use crate::error::PrivilegeError;

/// Policy deciding whether the stealth probe may run.
///
/// Any `Fn() -> Result<bool, PrivilegeError>` closure is a gate, which lets
/// callers pin the answer without touching process credentials.
pub trait PrivilegeGate: Send + Sync {
    fn can_open_raw_socket(&self) -> Result<bool, PrivilegeError>;
}

impl<F> PrivilegeGate for F
where
    F: Fn() -> Result<bool, PrivilegeError> + Send + Sync,
{
    fn can_open_raw_socket(&self) -> Result<bool, PrivilegeError> {
        self()
    }
}

/// Gate backed by the real process credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPrivilegeGate;

impl PrivilegeGate for SystemPrivilegeGate {
    fn can_open_raw_socket(&self) -> Result<bool, PrivilegeError> {
        can_open_raw_socket()
    }
}

/// True when the effective uid is 0 or, on Linux, when `CAP_NET_RAW` is in
/// the effective capability set.
#[cfg(unix)]
pub fn can_open_raw_socket() -> Result<bool, PrivilegeError> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } == 0 {
        return Ok(true);
    }
    has_cap_net_raw()
}

/// Raw sockets are not wired up outside unix; answer deterministically.
#[cfg(not(unix))]
pub fn can_open_raw_socket() -> Result<bool, PrivilegeError> {
    Err(PrivilegeError::Unsupported)
}

#[cfg(target_os = "linux")]
fn has_cap_net_raw() -> Result<bool, PrivilegeError> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    Ok(cap_eff_has_net_raw(&status))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn has_cap_net_raw() -> Result<bool, PrivilegeError> {
    Ok(false)
}

#[cfg(any(target_os = "linux", test))]
const CAP_NET_RAW: u32 = 13;

#[cfg(any(target_os = "linux", test))]
fn cap_eff_has_net_raw(status: &str) -> bool {
    status
        .lines()
        .find_map(|l| l.strip_prefix("CapEff:"))
        .and_then(|hex| u64::from_str_radix(hex.trim(), 16).ok())
        .map(|mask| mask & (1u64 << CAP_NET_RAW) != 0)
        .unwrap_or(false)
}
