//! Tracing setup shared by the automation binaries.
//!
//! Scripts run unattended from cron, so everything goes to stderr where the
//! scheduler captures it. `RUST_LOG` always wins over the configured level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `default_level` is used when `RUST_LOG` is unset (e.g. `"info"` from the
/// configuration file or a `--log_level` flag).
///
/// # Example
/// ```bash
/// RUST_LOG=launch=debug launch --config launch.toml start-runs
/// ```
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_ascii_lowercase()));

    // A second init (tests, embedded use) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
