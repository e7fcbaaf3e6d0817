//! Worker pool scheduler.
//!
//! A dispatcher feeds one job per port into a bounded queue shared by a
//! fixed number of workers. Each worker runs its job's protocols in order
//! and publishes one result per protocol. The dispatcher closes the result
//! stream only after every worker has exited, so the end of the stream means
//! the scan is complete (or was cancelled).

use crate::config::ScanConfig;
use crate::detector::{HeuristicOsDetector, OsDetector, ServiceDetector, SignatureServiceDetector};
use crate::error::ScanError;
use crate::privilege::{PrivilegeGate, SystemPrivilegeGate};
use crate::scanner::run_probe;
use crate::types::{PortJob, PortResult, ProtocolKind};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receiving end of a run. Yields exactly one result per (port, protocol)
/// and closes once the pool has shut down.
pub type ResultStream = mpsc::Receiver<PortResult>;

const JOB_QUEUE_DEPTH: usize = 1024;

/// One job per port, each carrying the full protocol list in caller order.
/// An empty protocol list means TCP only.
pub fn build_jobs(
    target: &str,
    ip: Ipv4Addr,
    ports: &[u16],
    protocols: &[ProtocolKind],
) -> Vec<PortJob> {
    let protocols = if protocols.is_empty() {
        vec![ProtocolKind::Tcp]
    } else {
        protocols.to_vec()
    };
    ports
        .iter()
        .map(|&port| PortJob {
            target: target.to_string(),
            ip,
            port,
            protocols: protocols.clone(),
        })
        .collect()
}

/// Turn the gate's answer into a run-level decision. Anything but an
/// explicit yes refuses the run.
pub fn check_privilege(gate: &dyn PrivilegeGate) -> Result<(), ScanError> {
    match gate.can_open_raw_socket() {
        Ok(true) => Ok(()),
        Ok(false) => Err(ScanError::privilege_required(
            "privilege gate denied raw socket access",
        )),
        Err(e) => Err(ScanError::privilege_required(e.to_string())),
    }
}

/// Read-only state shared by all workers of one run.
#[derive(Clone)]
struct WorkerContext {
    timeout: Duration,
    service: Option<Arc<dyn ServiceDetector>>,
    os: Option<Arc<dyn OsDetector>>,
}

/// Orchestrates one scan. Cheap to build; every `run` is independent.
pub struct Manager {
    cfg: ScanConfig,
    gate: Arc<dyn PrivilegeGate>,
    service: Arc<dyn ServiceDetector>,
    os: Arc<dyn OsDetector>,
}

impl Manager {
    pub fn new(cfg: ScanConfig) -> Self {
        Self {
            cfg,
            gate: Arc::new(SystemPrivilegeGate),
            service: Arc::new(SignatureServiceDetector),
            os: Arc::new(HeuristicOsDetector),
        }
    }

    pub fn with_privilege_gate(mut self, gate: impl PrivilegeGate + 'static) -> Self {
        self.gate = Arc::new(gate);
        self
    }

    pub fn with_service_detector(mut self, detector: impl ServiceDetector + 'static) -> Self {
        self.service = Arc::new(detector);
        self
    }

    pub fn with_os_detector(mut self, detector: impl OsDetector + 'static) -> Self {
        self.os = Arc::new(detector);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.cfg
    }

    /// Validate, build one job per configured port and start the pool.
    ///
    /// Must be called from within a tokio runtime. Fails before any worker
    /// starts on a bad configuration or a refused privilege check.
    pub fn run(&self, cancel: CancellationToken) -> Result<ResultStream, ScanError> {
        self.cfg.validate()?;
        let jobs = build_jobs(&self.cfg.target, self.cfg.ip, &self.cfg.ports, &self.cfg.protocols);
        self.run_jobs(jobs, cancel)
    }

    /// Start the pool on pre-built jobs, using this manager's worker count,
    /// timeout, detectors and privilege gate.
    pub fn run_jobs(
        &self,
        jobs: Vec<PortJob>,
        cancel: CancellationToken,
    ) -> Result<ResultStream, ScanError> {
        validate_jobs(&jobs)?;
        if jobs.iter().any(|j| j.protocols.contains(&ProtocolKind::Stealth)) {
            check_privilege(self.gate.as_ref())?;
        }

        let ctx = WorkerContext {
            timeout: self.cfg.timeout,
            service: self.cfg.service_detect.then(|| self.service.clone()),
            os: self.cfg.os_detect.then(|| self.os.clone()),
        };
        Ok(spawn_pool(jobs, self.cfg.effective_workers(), ctx, cancel))
    }
}

fn validate_jobs(jobs: &[PortJob]) -> Result<(), ScanError> {
    if jobs.is_empty() {
        return Err(ScanError::config("no ports to scan"));
    }
    for job in jobs {
        if job.target.trim().is_empty() {
            return Err(ScanError::config(format!("job for port {} has no target", job.port)));
        }
        if job.ip.is_unspecified() {
            return Err(ScanError::config(format!("job for port {} has no address", job.port)));
        }
        if job.protocols.is_empty() {
            return Err(ScanError::config(format!("job for port {} has no protocols", job.port)));
        }
    }
    Ok(())
}

fn spawn_pool(
    jobs: Vec<PortJob>,
    workers: usize,
    ctx: WorkerContext,
    cancel: CancellationToken,
) -> ResultStream {
    let expected: usize = jobs.iter().map(|j| j.protocols.len()).sum();
    info!(jobs = jobs.len(), expected, workers, "starting scan");

    // Sized for every result so workers never wait on a slow consumer.
    let (res_tx, res_rx) = mpsc::channel::<PortResult>(expected.max(1));
    let (job_tx, job_rx) = mpsc::channel::<PortJob>(JOB_QUEUE_DEPTH.min(jobs.len()).max(1));
    let job_rx = Arc::new(Mutex::new(job_rx));

    let mut set = JoinSet::new();
    for id in 0..workers {
        set.spawn(worker_loop(
            id,
            job_rx.clone(),
            res_tx.clone(),
            ctx.clone(),
            cancel.clone(),
        ));
    }
    tokio::spawn(dispatch(jobs, job_tx, set, res_tx, cancel));
    res_rx
}

/// Enqueue every job, close the queue, wait for the workers, then drop the
/// last result sender, which closes the stream.
async fn dispatch(
    jobs: Vec<PortJob>,
    job_tx: mpsc::Sender<PortJob>,
    mut workers: JoinSet<()>,
    results: mpsc::Sender<PortResult>,
    cancel: CancellationToken,
) {
    for job in jobs {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = job_tx.send(job) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
    drop(job_tx);

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "scan worker failed");
        }
    }
    drop(results);
    info!(cancelled = cancel.is_cancelled(), "scan finished");
}

async fn worker_loop(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<PortJob>>>,
    results: mpsc::Sender<PortResult>,
    ctx: WorkerContext,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job = async { jobs.lock().await.recv().await } => job,
        };
        let Some(job) = next else { break };

        for &protocol in &job.protocols {
            if cancel.is_cancelled() {
                return;
            }
            let res = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                res = execute(&job, protocol, &ctx) => res,
            };
            if results.send(res).await.is_err() {
                // Consumer went away; nobody is listening any more.
                return;
            }
        }
    }
    debug!(worker = id, "worker exiting");
}

/// One probe plus conditional enrichment.
async fn execute(job: &PortJob, protocol: ProtocolKind, ctx: &WorkerContext) -> PortResult {
    let mut res = run_probe(protocol, job.ip, job.port, ctx.timeout).await;
    res.target = job.target.clone();
    if !res.state.is_open() {
        return res;
    }

    if let Some(service) = &ctx.service {
        match time::timeout(ctx.timeout, service.detect(res.clone(), ctx.timeout)).await {
            Ok(enriched) => {
                res.service = enriched.service;
                res.banner = enriched.banner;
                res.confidence = enriched.confidence;
            }
            Err(_) => warn!(port = job.port, %protocol, "service detection exceeded its budget"),
        }
    }
    if let Some(os) = &ctx.os {
        if let Some((guess, confidence)) = os.detect(&res) {
            res.os_guess = Some(guess);
            res.confidence = Some(confidence);
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrivilegeError;

    #[test]
    fn jobs_keep_protocol_order() {
        let protos = [ProtocolKind::Udp, ProtocolKind::Stealth, ProtocolKind::Tcp];
        let jobs = build_jobs("host", Ipv4Addr::LOCALHOST, &[22, 80], &protos);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].port, 22);
        assert_eq!(jobs[1].protocols, protos.to_vec());
    }

    #[test]
    fn empty_protocols_default_to_tcp() {
        let jobs = build_jobs("host", Ipv4Addr::LOCALHOST, &[22], &[]);
        assert_eq!(jobs[0].protocols, vec![ProtocolKind::Tcp]);
    }

    #[test]
    fn privilege_check_only_accepts_explicit_yes() {
        let yes = || -> Result<bool, PrivilegeError> { Ok(true) };
        let no = || -> Result<bool, PrivilegeError> { Ok(false) };
        let broken = || -> Result<bool, PrivilegeError> { Err(PrivilegeError::Unsupported) };
        assert!(check_privilege(&yes).is_ok());
        let denied = check_privilege(&no).unwrap_err();
        assert!(denied.is_privilege_required());
        assert!(denied.to_string().contains("privilege gate denied raw socket access"));
        let err = check_privilege(&broken).unwrap_err();
        assert!(err.is_privilege_required());
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn job_validation() {
        assert!(validate_jobs(&[]).is_err());
        let mut jobs = build_jobs("host", Ipv4Addr::LOCALHOST, &[22], &[]);
        assert!(validate_jobs(&jobs).is_ok());
        jobs[0].protocols.clear();
        assert!(matches!(validate_jobs(&jobs), Err(ScanError::Config(_))));
    }
}
