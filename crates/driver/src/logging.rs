//! Logging setup

use crate::error::{DriverError, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the tracing subscriber; `RUST_LOG` overrides `default_level`
pub fn setup_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| DriverError::InvalidArgument(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| DriverError::InvalidArgument(format!("Logging already initialized: {}", e)))?;

    Ok(())
}
