use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerfscopeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Device {device} could not be resolved: {reason}")]
    DeviceError { device: String, reason: String },

    #[error("Failed to open counter {name}: {source}")]
    CounterOpenError {
        name: String,
        #[source]
        source: perfscope_raw::SysError,
    },

    #[error("perf_event operation failed: {0}")]
    SysError(#[from] perfscope_raw::SysError),

    #[error("Scope protocol violation: {0}")]
    ScopeError(String),

    #[error("Invalid engine state: {0}")]
    StateError(String),

    #[error("User-space PMU access is disabled (PMUSERENR = 0x{0:08x})")]
    HardwareAccess(u64),

    #[error("Nix error: {0}")]
    NixError(#[from] nix::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, PerfscopeError>;
