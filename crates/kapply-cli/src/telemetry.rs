//! Logging setup
//!
//! Priority for the filter:
//! 1. `--debug` (debug for kapply crates)
//! 2. `RUST_LOG`
//! 3. Default: warn
//!
//! Logs go to stderr so `--output json` stays parseable.

use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::new("warn,kapply=debug,kapply_kube=debug,kapply_core=debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(Level::WARN.into())
            .from_env_lossy()
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(debug)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
