//! Diagnostic tracing for the CLI.
//!
//! Product output (phase reports, status) goes to stdout with `println!`.
//! Tracing is for diagnostics only: `RUST_LOG` controls it, default `warn`,
//! written to stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
