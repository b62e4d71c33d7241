use std::io;

use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr.
///
/// The log level can be set with `RUST_LOG` and defaults to `info`.
pub fn init() {
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .event_format(format)
        .init();
}
