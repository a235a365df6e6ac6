use thiserror::Error;

use crate::gateway::GatewayError;
use crate::import::checkpoint::CheckpointError;
use crate::reader::ReaderError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("CSV read failed: {0}")]
    Reader(#[from] ReaderError),

    #[error("Remote gateway failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Checkpoint persistence failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Run log write failed: {0}")]
    RunLog(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ImportError>;
