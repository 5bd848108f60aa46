//! Tracing subscriber initialisation.

use assetstore_error::{AssetstoreError, AssetstoreResult, ConfigError};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Plain,
    /// One JSON object per event
    Json,
}

/// Install a global subscriber filtered by `RUST_LOG`.
///
/// Falls back to `info` when `RUST_LOG` is unset.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> AssetstoreResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match format {
        LogFormat::Plain => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_level(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| {
            AssetstoreError::from(ConfigError::telemetry(e))
        })
}
