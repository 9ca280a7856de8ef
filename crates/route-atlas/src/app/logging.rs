/// Logging setup for the command-line driver
///
/// Log output goes through a `tracing_subscriber` fmt layer filtered by
/// `RUST_LOG`. When the `profiling` feature is enabled, `profiling` scopes
/// are emitted as tracing spans and show up in the same output at trace level.
use tracing_subscriber::prelude::*;

#[cfg(debug_assertions)]
const DEFAULT_FILTER: &str = "debug";
#[cfg(not(debug_assertions))]
const DEFAULT_FILTER: &str = "info,route_atlas_lib=info";

/// Initialize logging. Call once at startup, before any other thread exists.
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            std::env::set_var("RUST_LOG", DEFAULT_FILTER);
        }
    }

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::from_default_env());

    if let Err(e) = tracing_subscriber::registry().with(fmt_layer).try_init() {
        eprintln!("Logging already initialized: {}", e);
    }
}
