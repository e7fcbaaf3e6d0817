//! Enrichment hooks run by a worker right after an `open` classification.

pub mod os;
pub mod service;
pub mod signatures;

pub use os::{guess_os, HeuristicOsDetector};
pub use service::SignatureServiceDetector;

use crate::types::{Confidence, PortResult};
use async_trait::async_trait;
use std::time::Duration;

/// Fills in service name, banner and confidence for an open result.
///
/// Implementations may do their own network I/O but must stay within
/// `budget`. The worker only copies the enrichment fields back, so changes
/// to port, protocol or state are discarded.
#[async_trait]
pub trait ServiceDetector: Send + Sync {
    async fn detect(&self, result: PortResult, budget: Duration) -> PortResult;
}

/// Best-effort OS guess from a result's existing fields. No I/O.
pub trait OsDetector: Send + Sync {
    fn detect(&self, result: &PortResult) -> Option<(String, Confidence)>;
}
