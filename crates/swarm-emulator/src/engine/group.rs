use crate::engine::listener::{serve, ListenerReport, ListenerSettings};
use crate::engine::planner::PortBucket;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// What happened to every port of one bucket.
#[derive(Debug, Clone, Default)]
pub struct GroupReport {
    pub finished: Vec<ListenerReport>,
    /// Ports whose listener failed, with the reason.
    pub failures: Vec<(u16, String)>,
}

impl GroupReport {
    pub fn failed_ports(&self) -> Vec<u16> {
        self.failures.iter().map(|(port, _)| *port).collect()
    }
}

/// Serves every port of `bucket` concurrently in the current runtime and
/// waits for all of them. A failing listener is recorded and its siblings
/// keep running.
pub async fn run_group(
    bucket: &PortBucket,
    settings: ListenerSettings,
    token: CancellationToken,
) -> GroupReport {
    let mut report = GroupReport::default();
    if bucket.is_empty() {
        return report;
    }

    info!(
        middlewares = bucket.len(),
        first_port = bucket.ports()[0],
        "Running middlewares"
    );

    let handles: Vec<_> = bucket
        .endpoints()
        .map(|spec| {
            let token = token.clone();
            let port = spec.port;
            let handle = tokio::spawn(async move { serve(&spec, &settings, token).await });
            (port, handle)
        })
        .collect();

    for (port, handle) in handles {
        match handle.await {
            Ok(Ok(r)) => report.finished.push(r),
            Ok(Err(e)) => {
                error!(port = port, error = %e, "Middleware failed");
                report.failures.push((port, e.to_string()));
            }
            Err(e) => {
                error!(port = port, error = %e, "Middleware task aborted");
                report.failures.push((port, e.to_string()));
            }
        }
    }

    report
}
