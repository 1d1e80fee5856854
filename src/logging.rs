//! Structured logging setup, shared by the library's own diagnostics and
//! the `photocat-cli` binary.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{CatalogError, Result};

/// Installs a global `tracing` subscriber filtered by `level` (an
/// `EnvFilter` directive string, e.g. `"info"` or `"photocat=debug"`).
/// Safe to call once per process; a second call returns an error rather
/// than panicking.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| CatalogError::Unknown(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .try_init()
        .map_err(|_| CatalogError::Unknown("logging already initialized".into()))
}
