//! Tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber on stderr.
///
/// `RUST_LOG` wins over `level` (from config or `RESTOCK_LOG`); the fallback
/// is `info`. Calling this twice is harmless.
pub fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
