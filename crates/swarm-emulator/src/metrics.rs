use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref LISTENERS_BOUND: IntGauge = IntGauge::new(
        "swarm_listeners_bound",
        "Number of middleware sockets currently bound in this process"
    )
    .expect("metric can be created");
    pub static ref CLIENTS_CONNECTED: IntGauge = IntGauge::new(
        "swarm_clients_connected",
        "Number of middleware clients currently being drained in this process"
    )
    .expect("metric can be created");
    pub static ref BYTES_DRAINED: IntCounter = IntCounter::new(
        "swarm_bytes_drained_total",
        "Total bytes read and discarded by middleware listeners"
    )
    .expect("metric can be created");
    pub static ref BIND_FAILURES: IntCounter = IntCounter::new(
        "swarm_bind_failures_total",
        "Total number of middleware ports that could not be bound"
    )
    .expect("metric can be created");
    /// Worker groups (processes or runtimes) started by this dispatcher and not yet exited
    pub static ref WORKER_GROUPS_RUNNING: IntGauge = IntGauge::new(
        "swarm_worker_groups_running",
        "Number of worker groups currently running"
    )
    .expect("metric can be created");
    pub static ref WORKER_GROUP_EXITS: IntCounter = IntCounter::new(
        "swarm_worker_group_exits_total",
        "Total number of worker groups that have exited"
    )
    .expect("metric can be created");
}

pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(LISTENERS_BOUND.clone()));
    let _ = REGISTRY.register(Box::new(CLIENTS_CONNECTED.clone()));
    let _ = REGISTRY.register(Box::new(BYTES_DRAINED.clone()));
    let _ = REGISTRY.register(Box::new(BIND_FAILURES.clone()));
    let _ = REGISTRY.register(Box::new(WORKER_GROUPS_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(WORKER_GROUP_EXITS.clone()));
}

pub fn render_metrics() -> String {
    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| "# Error: Invalid UTF8".to_string())
}

async fn metrics_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    match req.uri().path() {
        "/health" => Ok(Response::new(Body::from("OK"))),
        "/metrics" => Ok(Response::new(Body::from(render_metrics()))),
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

/// Serves `/health` and `/metrics` until the process exits.
pub async fn run_metrics_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    register_metrics();

    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(metrics_handler)) });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Observability server could not bind");
            return;
        }
    };

    info!(port = port, "Observability server online");

    if let Err(e) = server.await {
        error!(error = %e, "Observability server failed");
    }
}

/// Listener counters of one worker process, sent to the dispatcher as one
/// JSON line per snapshot on the worker's stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub listeners_bound: i64,
    pub clients_connected: i64,
    pub bytes_drained: u64,
    pub bind_failures: u64,
}

impl WorkerStats {
    /// Reads this process's listener metrics.
    pub fn snapshot() -> Self {
        Self {
            listeners_bound: LISTENERS_BOUND.get(),
            clients_connected: CLIENTS_CONNECTED.get(),
            bytes_drained: BYTES_DRAINED.get(),
            bind_failures: BIND_FAILURES.get(),
        }
    }
}

/// Folds one worker's snapshots into this process's metrics by applying the
/// difference to the previous snapshot.
#[derive(Debug, Default)]
pub struct StatsMirror {
    last: WorkerStats,
}

impl StatsMirror {
    pub fn last(&self) -> WorkerStats {
        self.last
    }

    pub fn apply(&mut self, next: WorkerStats) {
        LISTENERS_BOUND.add(next.listeners_bound - self.last.listeners_bound);
        CLIENTS_CONNECTED.add(next.clients_connected - self.last.clients_connected);
        BYTES_DRAINED.inc_by(next.bytes_drained.saturating_sub(self.last.bytes_drained));
        BIND_FAILURES.inc_by(next.bind_failures.saturating_sub(self.last.bind_failures));
        self.last = WorkerStats {
            bytes_drained: next.bytes_drained.max(self.last.bytes_drained),
            bind_failures: next.bind_failures.max(self.last.bind_failures),
            ..next
        };
    }

    /// The worker is gone: its sockets no longer count, its totals stay.
    pub fn clear(&mut self) {
        self.apply(WorkerStats {
            listeners_bound: 0,
            clients_connected: 0,
            ..self.last
        });
    }
}

/// Worker side: writes a snapshot every `every` and a final one once `token` fires.
pub async fn report_worker_stats(every: Duration, token: CancellationToken) {
    let mut stdout = tokio::io::stdout();
    let mut interval = tokio::time::interval(every);

    loop {
        let last = tokio::select! {
            _ = interval.tick() => false,
            _ = token.cancelled() => true,
        };
        let line = match serde_json::to_string(&WorkerStats::snapshot()) {
            Ok(line) => line + "\n",
            Err(e) => {
                warn!(error = %e, "Failed to encode worker stats");
                return;
            }
        };
        if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            // Nobody is reading anymore.
            return;
        }
        if last {
            return;
        }
    }
}

/// Dispatcher side: mirrors every stats line of one worker until its stdout closes.
pub async fn mirror_worker_stats<R>(group: usize, output: R) -> StatsMirror
where
    R: AsyncRead + Unpin,
{
    let mut mirror = StatsMirror::default();
    let mut lines = BufReader::new(output).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<WorkerStats>(&line) {
                Ok(stats) => mirror.apply(stats),
                Err(_) => debug!(group = group, line = %line, "Ignoring worker output"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(group = group, error = %e, "Lost worker stats stream");
                break;
            }
        }
    }

    mirror
}
