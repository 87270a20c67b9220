use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable controlling the log output format (`pretty` or `json`).
const LOG_FORMAT_ENV_NAME: &str = "APP_LOG_FORMAT";

/// Errors that can occur while initializing tracing.
#[derive(Debug, Error)]
pub enum TracingError {
    /// The `RUST_LOG` filter directive could not be parsed.
    #[error("invalid tracing filter directive: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber was already installed.
    #[error("failed to install the global tracing subscriber: {0}")]
    SubscriberInstall(#[from] tracing_subscriber::util::TryInitError),
}

/// Guard that flushes buffered log lines when dropped.
///
/// Hold this for the lifetime of the process; dropping it early silently
/// discards any log lines still queued in the non-blocking writer.
#[must_use = "dropping the flusher stops log delivery"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Initializes the global tracing subscriber for a service binary.
///
/// Logs go to stdout through a non-blocking writer. The filter honors
/// `RUST_LOG` and defaults to `info` for the service itself. Set
/// `APP_LOG_FORMAT=json` for machine-readable output in production.
pub fn init_tracing(service_name: &str) -> Result<LogFlusher, TracingError> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{}=info", service_name.replace('-', "_"))));

    let use_json = std::env::var(LOG_FORMAT_ENV_NAME)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init()?;
    } else {
        registry.with(fmt::layer().with_writer(writer)).try_init()?;
    }

    Ok(LogFlusher { _guard: guard })
}

/// Initializes tracing for tests.
///
/// Safe to call from every test; only the first call installs a subscriber
/// and later calls are no-ops. Output goes to the test writer so it is
/// captured per test.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
