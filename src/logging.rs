//! Diagnostic logging setup.
//!
//! Reports go to stdout; log records always go to stderr so they never mix
//! with generated output or validation results.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a `-v` count, falling back to `configured`.
pub fn level_for(verbosity: u8, configured: &str) -> String {
    let level = match verbosity {
        0 => return format!("registry_compiler={0},regc={0}", configured),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("registry_compiler={0},regc={0}", level)
}

/// Install the global subscriber. `RUST_LOG` overrides `default_directive`.
///
/// Calling this twice is harmless; the second call keeps the first subscriber.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
