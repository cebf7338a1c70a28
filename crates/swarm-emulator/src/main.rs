use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use swarm_emulator::cli::{Cli, Commands, WorkerArgs};
use swarm_emulator::engine::dispatcher::{dispatch, DispatchOptions, GroupExit};
use swarm_emulator::engine::group::run_group;
use swarm_emulator::engine::listener::ListenerSettings;
use swarm_emulator::engine::planner::plan_with_capacity;
use swarm_emulator::identity::{
    publish_in_background, IdentityFormat, IdentityListing, ScriptAnnouncer,
};
use swarm_emulator::metrics;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Worker processes log to stderr; their stdout carries stats for the dispatcher.
fn init_production_logging(to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer().json().with_target(true);

    if to_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

/// Entry point of a worker process: serve one bucket until killed.
async fn run_worker(args: &WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let bucket = args.bucket();
    let stats_token = CancellationToken::new();
    let stats = tokio::spawn(metrics::report_worker_stats(
        Duration::from_millis(args.stats_interval_ms),
        stats_token.clone(),
    ));

    let report = run_group(&bucket, args.settings(), CancellationToken::new()).await;
    stats_token.cancel();
    let _ = stats.await;

    if !report.failures.is_empty() {
        warn!(
            failed = report.failures.len(),
            ports = ?report.failed_ports(),
            "Some middlewares failed"
        );
    }
    if report.finished.is_empty() && !report.failures.is_empty() {
        return Err("no middleware in this group could be served".into());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_production_logging(matches!(cli.command, Some(Commands::Worker(_))));

    if let Some(Commands::Worker(args)) = &cli.command {
        return run_worker(args).await;
    }

    let config = cli.resolve_config()?;
    let ep = &config.endpoints;
    let plan = plan_with_capacity(ep.count, ep.base_port, ep.bucket_capacity)?;
    info!(
        middlewares = plan.total_ports(),
        buckets = plan.buckets.len(),
        base_port = ep.base_port,
        isolation = ?config.dispatch.isolation,
        "Middleware swarm planned"
    );

    let publisher = if config.identity.enabled {
        let listing =
            IdentityListing::build(&plan.endpoints, &IdentityFormat::from(&config.identity));
        let announcer = Arc::new(ScriptAnnouncer::from_config(&config.identity));
        Some(publish_in_background(announcer, listing))
    } else {
        None
    };

    if config.metrics.enabled {
        let port = config.metrics.port;
        tokio::spawn(async move {
            metrics::run_metrics_server(port).await;
        });
    }

    let master_token = CancellationToken::new();
    let signal_token = master_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let settings = ListenerSettings::from_config(ep, config.dispatch.on_disconnect);
    let opts = DispatchOptions::current_exe(config.dispatch.isolation, settings)?;
    let report = dispatch(&plan.buckets, &opts, master_token).await;

    for exit in &report.exits {
        match exit {
            GroupExit::Exited { group, code } => {
                info!(group = group, code = ?code, "Worker group ended")
            }
            GroupExit::Finished { group, report } => info!(
                group = group,
                finished = report.finished.len(),
                failed = report.failures.len(),
                "Worker group ended"
            ),
            GroupExit::Failed { group, reason } => {
                error!(group = group, reason = %reason, "Worker group failed")
            }
        }
    }

    if let Some(handle) = publisher {
        if let Err(e) = handle.await {
            error!(error = %e, "Identity publisher task failed");
        }
    }

    info!(groups = report.exits.len(), "All worker groups finished");
    Ok(())
}
