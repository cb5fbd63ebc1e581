//! vigilar CLI - drift monitoring for tabular data
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `vigilar=info`
//! filter); reports go to stdout.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigilar=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    vigilar::cli::run()
}
