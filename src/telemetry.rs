//! Tracing initialization.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Controlled by `RUST_LOG`, e.g. `RUST_LOG=debug,tower_http=info`; defaults
/// to `info,tower_http=info` when unset. Errors if `RUST_LOG` is set but
/// isn't a valid filter directive string, rather than silently falling back
/// to the default.
pub fn init() -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().context("RUST_LOG is not a valid filter directive")?
    } else {
        EnvFilter::new("info,tower_http=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
    Ok(())
}
