//! `tracing` subscriber setup for the indexer binaries.
//!
//! Console output is human-readable text. When a log directory is given, a
//! second layer writes one JSON object per event to a daily-rotating file, so
//! the component label in each message can be searched without parsing text.
//! `RUST_LOG` overrides the configured level.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `log_level` is `info` or `debug` in practice; any `EnvFilter` directive is
/// accepted. `file_prefix` names the rotated files inside `log_dir`.
/// Fails if a global subscriber is already installed.
pub fn init_logging(log_level: &str, log_dir: Option<&str>, file_prefix: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(normalize_level(log_level))?,
    };

    let console = fmt::layer().with_target(true).with_thread_ids(true);

    let file = log_dir.map(|dir| {
        fmt::layer()
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, file_prefix))
            .with_ansi(false)
            .with_current_span(false)
    });

    tracing_subscriber::registry().with(filter).with(console).with(file).try_init()?;
    Ok(())
}

/// Empty means `info`; everything else is trimmed and lowercased.
pub fn normalize_level(log_level: &str) -> String {
    match log_level.trim() {
        "" => "info".to_string(),
        level => level.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_level_defaults_to_info() {
        assert_eq!(normalize_level(""), "info");
        assert_eq!(normalize_level("  "), "info");
    }

    #[test]
    fn level_is_lowercased() {
        assert_eq!(normalize_level("DEBUG"), "debug");
        assert_eq!(normalize_level("gmi_stream=trace"), "gmi_stream=trace");
    }
}
