//! Logging for the agent.
//!
//! Logs go to stderr so a wrapper can keep stdout for itself.

use crate::config::LogConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FALLBACK_LEVEL: &str = "info";

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` wins over the configured level.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.with_target),
        )
        .try_init()?;

    Ok(())
}

/// Filter for a configured level or directive list; unparsable input falls back to `info`.
fn configured_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid log level {:?} ({}), using {}", level, e, FALLBACK_LEVEL);
        EnvFilter::new(FALLBACK_LEVEL)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::{Layer, Registry};

    fn max_level(filter: &EnvFilter) -> Option<LevelFilter> {
        Layer::<Registry>::max_level_hint(filter)
    }

    #[test]
    fn test_configured_level() {
        assert_eq!(max_level(&configured_filter("debug")), Some(LevelFilter::DEBUG));
        assert_eq!(max_level(&configured_filter("warn,snapshot_agent=trace")), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_bad_level_falls_back_to_info() {
        assert_eq!(max_level(&configured_filter("snapshot_agent=loud")), Some(LevelFilter::INFO));
    }
}
