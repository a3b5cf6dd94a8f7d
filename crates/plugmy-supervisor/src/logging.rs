//! Logging utilities for the supervisor.
//!
//! Initializes structured logging using `tracing` and `tracing-subscriber`.
//! Filter settings come from `RUST_LOG`; when it is unset or invalid the
//! supervisor logs at `info`. Output goes to stderr so that commands printing
//! JSON on stdout stay machine readable.

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter applied when `RUST_LOG` does not provide one.
const DEFAULT_FILTER: &str = "info";

/// Initialize the global tracing subscriber writing to stderr.
///
/// Call `init` before any logging statements to avoid missing logs.
///
/// # Examples
///
/// ```rust,no_run
/// use plugmy_supervisor::logging::init;
///
/// init();
/// tracing::info!("Logging is initialized!");
/// ```
pub fn init() {
    init_with_writer(fmt::writer::BoxMakeWriter::new(std::io::stderr));
}

/// Initialize logging with a custom writer.
pub fn init_with_writer<W>(writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(writer)
        .init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
