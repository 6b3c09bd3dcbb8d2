//! Error types for the breakwater filter.

use std::io;

use thiserror::Error;

/// Main error type for filter operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("blocklist error: {0}")]
    List(#[from] crate::blocklist::LoadError),

    #[error("guarded-targets error: {0}")]
    Targets(#[from] crate::guard::TargetsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Tunnel device and packet-loop errors.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("failed to open tunnel device: {0}")]
    DeviceOpen(String),

    #[error("device read failed: {0}")]
    Read(#[source] io::Error),

    #[error("device write failed: {0}")]
    Write(#[source] io::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
