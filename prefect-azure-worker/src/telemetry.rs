//! Tracing subscriber setup.
//!
//! The filter comes from `RUST_LOG`, then `PREFECT_AZURE_LOG_LEVEL`, then
//! `info`. `PREFECT_AZURE_LOG_FORMAT=json` switches to JSON lines.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the fallback log filter.
pub const LOG_LEVEL_ENV: &str = "PREFECT_AZURE_LOG_LEVEL";

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "PREFECT_AZURE_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Parse a format name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" | "compact" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }

    /// Read the format from the environment.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

fn filter_from(rust_log: Option<String>, level: Option<String>) -> EnvFilter {
    rust_log
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| level.and_then(|v| EnvFilter::try_new(v).ok()))
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Build the log filter from the environment.
pub fn env_filter() -> EnvFilter {
    filter_from(
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        std::env::var(LOG_LEVEL_ENV).ok(),
    )
}

/// Create a subscriber configured from the environment.
pub fn subscriber() -> impl tracing::Subscriber + Send + Sync {
    subscriber_with(env_filter(), LogFormat::from_env())
}

/// Create a subscriber with an explicit filter and format.
pub fn subscriber_with(
    filter: EnvFilter,
    format: LogFormat,
) -> impl tracing::Subscriber + Send + Sync {
    let json = format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().flatten_event(true)))
        .with((!json).then(|| fmt::layer()))
}

/// Install the environment-configured subscriber as the global default.
///
/// Returns `false` if a global subscriber was already set.
pub fn init() -> bool {
    tracing::subscriber::set_global_default(subscriber()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_filter_precedence() {
        let filter = filter_from(Some("debug".into()), Some("warn".into()));
        assert_eq!(filter.to_string(), "debug");

        let filter = filter_from(None, Some("prefect_azure_worker=trace".into()));
        assert_eq!(filter.to_string(), "prefect_azure_worker=trace");

        let filter = filter_from(Some("prefect=loud".into()), None);
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_subscriber_dispatches() {
        let subscriber = subscriber_with(EnvFilter::new("off"), LogFormat::Json);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("dropped by the filter");
        });
    }
}
