//! Logging setup for the binary.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Output goes to stderr so command
/// output on stdout stays clean.
///
/// `RUST_LOG` wins over `verbose`. Calling this twice is a no-op.
pub fn init(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}
