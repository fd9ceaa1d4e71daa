//! Log output for the server binary.

use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// The logger could not be installed.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Another tracing subscriber is already the global default.
    #[error("a global tracing subscriber is already installed: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
    /// Another `log` logger is already installed.
    #[error("a log backend is already installed: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// Installs a fmt subscriber filtered by `RUST_LOG` and routes `log` records into it.
///
/// The library crates log through the `log` facade, so the bridge is what makes
/// their output visible.
pub fn init_logging() -> Result<(), LoggerError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}
