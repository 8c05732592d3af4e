use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for configuration persistence.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors from reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file {path:?} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A specialized `Result` type for engine lifecycle calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// The error type for start/stop/reload on the sentry engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Sentry is already running")]
    AlreadyRunning,

    #[error("Templates can only be reloaded while the sentry is idle")]
    ReloadWhileRunning,

    #[error("Failed to spawn scan worker: {source}")]
    SpawnFailed {
        #[from]
        source: std::io::Error,
    },

    #[error("Scan worker panicked")]
    WorkerPanicked,
}
