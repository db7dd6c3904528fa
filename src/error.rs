// Error types for the room monitor
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Required argument missing: {0}")]
    ArgumentMissing(&'static str),

    #[error("Sample source not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid sample source: {0}")]
    Invalid(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
