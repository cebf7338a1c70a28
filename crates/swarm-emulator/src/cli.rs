use crate::engine::listener::ListenerSettings;
use crate::engine::planner::PortBucket;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use swarm_common::{Config, ConfigError, DisconnectPolicy, Isolation};

/// Emulates many middleware endpoints, each a TCP port that drains its single client.
#[derive(Parser, Debug)]
#[command(name = "swarm-emulator", version)]
pub struct Cli {
    /// Number of middlewares to emulate [default: 100]
    #[arg(short = 'n', long = "num-middlewares", allow_negative_numbers = true)]
    pub num_middlewares: Option<i64>,

    /// First port; middleware i listens on base_port + i [default: 14567]
    #[arg(long)]
    pub base_port: Option<u16>,

    /// YAML config file. Flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// How worker groups are isolated from each other
    #[arg(long, value_enum)]
    pub isolation: Option<IsolationArg>,

    /// What a middleware does after its client disconnects
    #[arg(long, value_enum)]
    pub on_disconnect: Option<DisconnectArg>,

    /// Skip writing and announcing the identity listing
    #[arg(long)]
    pub no_identity: bool,

    /// Serve /health and /metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve one bucket of ports in this process (started by the dispatcher)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WorkerArgs {
    #[arg(long, value_delimiter = ',', required = true)]
    pub ports: Vec<u16>,

    /// Endpoint ordinal of the first port
    #[arg(long, default_value_t = 0)]
    pub first_index: usize,

    #[arg(
        long,
        default_value_t = 1024,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub backlog: u32,

    /// How often listener counters are written to stdout
    #[arg(
        long,
        default_value_t = 500,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub stats_interval_ms: u64,

    #[arg(long, value_enum, default_value_t = DisconnectArg::Terminate)]
    pub on_disconnect: DisconnectArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationArg {
    Process,
    Runtime,
}

impl From<IsolationArg> for Isolation {
    fn from(arg: IsolationArg) -> Self {
        match arg {
            IsolationArg::Process => Isolation::Process,
            IsolationArg::Runtime => Isolation::Runtime,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectArg {
    Terminate,
    Reaccept,
}

impl From<DisconnectArg> for DisconnectPolicy {
    fn from(arg: DisconnectArg) -> Self {
        match arg {
            DisconnectArg::Terminate => DisconnectPolicy::Terminate,
            DisconnectArg::Reaccept => DisconnectPolicy::Reaccept,
        }
    }
}

impl Cli {
    /// Defaults, then the config file, then flags. The result is validated.
    pub fn resolve_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(n) = self.num_middlewares {
            config.endpoints.count = n;
        }
        if let Some(port) = self.base_port {
            config.endpoints.base_port = port;
        }
        if let Some(isolation) = self.isolation {
            config.dispatch.isolation = isolation.into();
        }
        if let Some(policy) = self.on_disconnect {
            config.dispatch.on_disconnect = policy.into();
        }
        if self.no_identity {
            config.identity.enabled = false;
        }
        if let Some(port) = self.metrics_port {
            config.metrics.enabled = true;
            config.metrics.port = port;
        }

        config.validate()?;
        Ok(config)
    }
}

impl WorkerArgs {
    pub fn bucket(&self) -> PortBucket {
        PortBucket::new(self.first_index, self.ports.clone())
    }

    pub fn settings(&self) -> ListenerSettings {
        ListenerSettings {
            chunk_size: self.chunk_size,
            backlog: self.backlog,
            on_disconnect: self.on_disconnect.into(),
        }
    }
}
