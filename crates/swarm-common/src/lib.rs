use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Largest number of ports one worker group may own.
pub const MAX_BUCKET_CAPACITY: usize = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub endpoints: EndpointsConfig,
    pub dispatch: DispatchConfig,
    pub identity: IdentityConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Number of emulated middlewares. Signed so that a negative value
    /// reaches validation instead of failing deserialization.
    pub count: i64,
    pub base_port: u16,
    pub bucket_capacity: usize,
    pub read_chunk_size: usize,
    pub accept_backlog: u32,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            count: 100,
            base_port: 14567,
            bucket_capacity: MAX_BUCKET_CAPACITY,
            read_chunk_size: 1024,
            accept_backlog: 1,
        }
    }
}

/// How worker groups are isolated from each other.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// One child OS process per bucket.
    #[default]
    Process,
    /// One OS thread per bucket, each driving its own tokio runtime.
    Runtime,
}

/// What a listener does once its single client goes away.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectPolicy {
    /// End the listener task; the port is released.
    #[default]
    Terminate,
    /// Keep the listening socket and accept the next single client.
    Reaccept,
}

impl DisconnectPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectPolicy::Terminate => "terminate",
            DisconnectPolicy::Reaccept => "reaccept",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DispatchConfig {
    pub isolation: Isolation,
    pub on_disconnect: DisconnectPolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    pub enabled: bool,
    /// File the listing is written to before the runner is invoked.
    pub path: String,
    /// External executable that announces the listing.
    pub runner: String,
    pub type_tag: String,
    pub label: String,
    pub service_code: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "identity".to_string(),
            runner: "./identity_runner.sh".to_string(),
            type_tag: "3".to_string(),
            label: "Test Room".to_string(),
            service_code: "2222".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9464,
        }
    }
}

impl Config {
    /// Parses a YAML document. Missing sections and fields take their defaults.
    pub fn from_yaml(data: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(data).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: origin.clone(),
            source,
        })?;
        Self::from_yaml(&data, &origin)
    }

    /// Checks the invariants the engine relies on. Must pass before any socket opens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ep = &self.endpoints;
        if ep.count < 0 {
            return Err(ConfigError::Invalid(format!(
                "number of middlewares must be non-negative, got {}",
                ep.count
            )));
        }
        if ep.bucket_capacity == 0 || ep.bucket_capacity > MAX_BUCKET_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "bucket capacity must be within 1..={}, got {}",
                MAX_BUCKET_CAPACITY, ep.bucket_capacity
            )));
        }
        if ep.read_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "read chunk size must be positive".to_string(),
            ));
        }
        if ep.accept_backlog == 0 {
            return Err(ConfigError::Invalid(
                "accept backlog must be positive".to_string(),
            ));
        }
        if ep.count > 0 && u64::from(ep.base_port) + ep.count as u64 - 1 > u64::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "{} ports starting at {} exceed the port range",
                ep.count, ep.base_port
            )));
        }
        if self.identity.enabled && self.identity.runner.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "identity runner must be set when identity publishing is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
