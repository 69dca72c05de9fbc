//! Tracing bootstrap for applications embedding docscope.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application. [`init_tracing`] is the stock way to do it.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid filter directive: {0}")]
    InvalidDirective(String),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Install a global fmt subscriber.
///
/// The filter comes from `RUST_LOG` when it is set and valid, otherwise from
/// `default_directive` (e.g. `"docscope=debug"`).
pub fn init_tracing(default_directive: &str) -> Result<(), LoggingError> {
    let fallback = EnvFilter::try_new(default_directive)
        .map_err(|err| LoggingError::InvalidDirective(format!("{default_directive}: {err}")))?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(fallback);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
