//! Fans port buckets out to isolated worker groups and waits for all of them.
//!
//! Two isolation backends are available:
//! - [`Isolation::Process`]: each bucket runs in a child process re-executing
//!   this binary with the hidden `worker` subcommand. A crash only takes down
//!   that bucket's ports.
//! - [`Isolation::Runtime`]: each bucket runs on its own OS thread driving a
//!   private single-threaded tokio runtime. A panic is contained to the thread.
//!
//! Cancelling the token kills worker processes and stops runtime workers.
//!
//! Worker processes report their listener counters as JSON lines on stdout;
//! the dispatcher folds them into its own metrics so `/metrics` covers every
//! group regardless of the backend.

use crate::engine::group::{run_group, GroupReport};
use crate::engine::listener::ListenerSettings;
use crate::engine::planner::PortBucket;
use crate::error::{EmulatorError, Result};
use crate::metrics;
use std::path::PathBuf;
use std::process::Stdio;
use swarm_common::Isolation;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub isolation: Isolation,
    pub settings: ListenerSettings,
    /// Executable started for each process worker group.
    pub worker_program: PathBuf,
}

impl DispatchOptions {
    /// Uses the running executable as the worker program.
    pub fn current_exe(isolation: Isolation, settings: ListenerSettings) -> Result<Self> {
        Ok(Self {
            isolation,
            settings,
            worker_program: std::env::current_exe()?,
        })
    }
}

/// How one worker group ended.
#[derive(Debug, Clone)]
pub enum GroupExit {
    /// A worker process exited. `code` is `None` when it was killed by a signal.
    Exited { group: usize, code: Option<i32> },
    /// An in-process runtime worker returned.
    Finished { group: usize, report: GroupReport },
    /// The group could not be started or crashed.
    Failed { group: usize, reason: String },
}

impl GroupExit {
    pub fn group(&self) -> usize {
        match self {
            GroupExit::Exited { group, .. }
            | GroupExit::Finished { group, .. }
            | GroupExit::Failed { group, .. } => *group,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub exits: Vec<GroupExit>,
}

struct RunningGroup;

impl RunningGroup {
    fn new() -> Self {
        metrics::WORKER_GROUPS_RUNNING.inc();
        Self
    }
}

impl Drop for RunningGroup {
    fn drop(&mut self) {
        metrics::WORKER_GROUPS_RUNNING.dec();
        metrics::WORKER_GROUP_EXITS.inc();
    }
}

fn worker_command(opts: &DispatchOptions, bucket: &PortBucket) -> Command {
    let ports = bucket
        .ports()
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let mut cmd = Command::new(&opts.worker_program);
    cmd.arg("worker")
        .arg("--ports")
        .arg(ports)
        .arg("--first-index")
        .arg(bucket.first_index().to_string())
        .arg("--chunk-size")
        .arg(opts.settings.chunk_size.to_string())
        .arg("--backlog")
        .arg(opts.settings.backlog.to_string())
        .arg("--on-disconnect")
        .arg(opts.settings.on_disconnect.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

fn spawn_process_group(
    group: usize,
    bucket: &PortBucket,
    opts: &DispatchOptions,
    token: CancellationToken,
) -> Result<JoinHandle<GroupExit>> {
    let mut child: Child = worker_command(opts, bucket)
        .spawn()
        .map_err(|source| EmulatorError::Spawn { group, source })?;
    let pid = child.id();
    info!(group = group, pid = ?pid, ports = bucket.len(), "Worker process started");
    let stats = child
        .stdout
        .take()
        .map(|out| tokio::spawn(metrics::mirror_worker_stats(group, out)));

    Ok(tokio::spawn(async move {
        let _running = RunningGroup::new();
        let status = tokio::select! {
            status = child.wait() => status,
            _ = token.cancelled() => {
                debug!(group = group, pid = ?pid, "Killing worker process");
                if let Err(e) = child.kill().await {
                    warn!(group = group, error = %e, "Failed to kill worker process");
                }
                child.wait().await
            }
        };
        if let Some(stats) = stats {
            if let Ok(mut mirror) = stats.await {
                mirror.clear();
            }
        }
        match status {
            Ok(status) => {
                info!(group = group, pid = ?pid, status = %status, "Worker process exited");
                GroupExit::Exited {
                    group,
                    code: status.code(),
                }
            }
            Err(e) => GroupExit::Failed {
                group,
                reason: e.to_string(),
            },
        }
    }))
}

fn spawn_runtime_group(
    group: usize,
    bucket: &PortBucket,
    opts: &DispatchOptions,
    token: CancellationToken,
) -> Result<JoinHandle<GroupExit>> {
    let bucket = bucket.clone();
    let settings = opts.settings;
    let (done_tx, done_rx) = oneshot::channel::<std::io::Result<GroupReport>>();
    std::thread::Builder::new()
        .name(format!("worker-group-{}", group))
        .spawn(move || {
            let outcome = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map(|rt| rt.block_on(run_group(&bucket, settings, token)));
            let _ = done_tx.send(outcome);
        })
        .map_err(|source| EmulatorError::Spawn { group, source })?;
    info!(group = group, "Worker runtime started");

    // A panicking worker thread drops the sender without sending.
    Ok(tokio::spawn(async move {
        let _running = RunningGroup::new();
        match done_rx.await {
            Ok(Ok(report)) => GroupExit::Finished { group, report },
            Ok(Err(e)) => GroupExit::Failed {
                group,
                reason: format!("runtime build failed: {}", e),
            },
            Err(_) => GroupExit::Failed {
                group,
                reason: "worker group panicked".to_string(),
            },
        }
    }))
}

/// Runs one isolated worker group per non-empty bucket and waits for every
/// group to end. With an uncancelled token this is the program's steady state.
pub async fn dispatch(
    buckets: &[PortBucket],
    opts: &DispatchOptions,
    token: CancellationToken,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    let mut running = Vec::with_capacity(buckets.len());

    for (group, bucket) in buckets.iter().enumerate() {
        if bucket.is_empty() {
            debug!(group = group, "Skipping empty bucket");
            continue;
        }
        let spawned = match opts.isolation {
            Isolation::Process => spawn_process_group(group, bucket, opts, token.child_token()),
            Isolation::Runtime => spawn_runtime_group(group, bucket, opts, token.child_token()),
        };
        match spawned {
            Ok(handle) => running.push((group, handle)),
            Err(e) => {
                error!(group = group, error = %e, "Worker group did not start");
                report.exits.push(GroupExit::Failed {
                    group,
                    reason: e.to_string(),
                });
            }
        }
    }

    for (group, handle) in running {
        let exit = match handle.await {
            Ok(exit) => exit,
            Err(e) => GroupExit::Failed {
                group,
                reason: EmulatorError::from(e).to_string(),
            },
        };
        report.exits.push(exit);
    }

    report.exits.sort_by_key(GroupExit::group);
    report
}
