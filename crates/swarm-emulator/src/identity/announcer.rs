use crate::error::{EmulatorError, Result};
use crate::identity::listing::IdentityListing;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use swarm_common::IdentityConfig;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Hands a finished listing to whatever announces it to the outside world.
pub trait Announcer: Send + Sync {
    fn publish(&self, listing: &IdentityListing) -> Result<()>;
}

/// Writes the listing to a file, then runs an external script that picks it up.
#[derive(Debug, Clone)]
pub struct ScriptAnnouncer {
    pub path: PathBuf,
    pub runner: PathBuf,
}

impl ScriptAnnouncer {
    pub fn new(path: impl Into<PathBuf>, runner: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            runner: runner.into(),
        }
    }

    pub fn from_config(cfg: &IdentityConfig) -> Self {
        Self::new(&cfg.path, &cfg.runner)
    }
}

impl Announcer for ScriptAnnouncer {
    fn publish(&self, listing: &IdentityListing) -> Result<()> {
        fs::write(&self.path, listing.as_str())?;

        let status = Command::new(&self.runner)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| {
                EmulatorError::Announce(format!("cannot run {}: {}", self.runner.display(), e))
            })?;

        if !status.success() {
            return Err(EmulatorError::Announce(format!(
                "{} exited with {}",
                self.runner.display(),
                status
            )));
        }
        Ok(())
    }
}

/// Publishes once on the blocking pool. Failures are logged, never retried.
/// Join the handle after dispatch to tie it to the program's lifetime.
pub fn publish_in_background(
    announcer: Arc<dyn Announcer>,
    listing: IdentityListing,
) -> JoinHandle<Result<()>> {
    tokio::task::spawn_blocking(move || {
        let res = announcer.publish(&listing);
        match &res {
            Ok(()) => info!(records = listing.records(), "Identity listing published"),
            Err(e) => warn!(error = %e, "Identity publishing failed"),
        }
        res
    })
}
