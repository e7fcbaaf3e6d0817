//! Library crate for port-prowler-rs: a single-host port prober with a
//! bounded worker pool, a streamed result channel and opt-in enrichment.
pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod output;
pub mod ports;
pub mod privilege;
pub mod resolver;
pub mod scanner;
pub mod types;

pub use config::ScanConfig;
pub use error::{PrivilegeError, ScanError};
pub use scanner::{Manager, ResultStream};
pub use types::{Confidence, PortJob, PortResult, ProtocolKind, ScanReport, ScanState};
