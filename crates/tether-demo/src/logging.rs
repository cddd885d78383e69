//! Subscriber setup for the demo binary.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::LogFormat;
use crate::error::{DemoError, Result};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "TETHER_LOG";

/// Filter used when `TETHER_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for the report.
pub fn init(format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry().with(filter());
    let installed = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|err| DemoError::Logging {
        message: err.to_string(),
    })
}
