use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("port {port} is already in use: {source}")]
    BindConflict {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity announcement failed: {0}")]
    Announce(String),

    #[error("failed to spawn worker group {group}: {source}")]
    Spawn {
        group: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("task join error: {0}")]
    Join(String),
}

impl From<swarm_common::ConfigError> for EmulatorError {
    fn from(e: swarm_common::ConfigError) -> Self {
        EmulatorError::InvalidConfiguration(e.to_string())
    }
}

impl From<tokio::task::JoinError> for EmulatorError {
    fn from(e: tokio::task::JoinError) -> Self {
        EmulatorError::Join(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
