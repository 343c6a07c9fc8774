//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; applications that have no
//! subscriber of their own can install this one.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a JSON subscriber filtered by `RUST_LOG`, or by `default_directive`
/// when `RUST_LOG` is unset or invalid.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
}
