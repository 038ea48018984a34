//! Tracing subscriber setup shared by the producer and consumer binaries

use tracing_subscriber::EnvFilter;

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` is ignored; verbosity comes only from the command line.
pub fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new(directives("info", "warn")),
            1 => EnvFilter::new(directives("debug", "info")),
            2 => EnvFilter::new(directives("trace", "debug")),
            _ => EnvFilter::new("trace"),
        }
    };

    // try_init so tests and repeated calls don't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .try_init();
}

/// Builds filter directives covering the library and both binaries
fn directives(ours: &str, rest: &str) -> String {
    format!(
        "ripple_queue={ours},ripple_producer={ours},ripple_consumer={ours},{rest}",
        ours = ours,
        rest = rest
    )
}
