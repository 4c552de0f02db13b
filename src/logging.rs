//! Tracing subscriber setup.
//!
//! Logs go to stderr so they never interleave with the chat transcript on
//! stdout. `RUST_LOG` takes precedence over the verbosity flag.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a `-v` count
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "refine=warn",
        1 => "refine=info",
        _ => "refine=debug",
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init(verbosity: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
}
