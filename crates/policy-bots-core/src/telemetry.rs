//! Tracing initialisation for the policy bot binaries.
//!
//! Logs go to stderr so that reports printed on stdout (`--output json`)
//! stay machine-readable. `RUST_LOG` overrides the default level.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the filter: `RUST_LOG` when set, otherwise `level` for this
/// workspace's crates and `warn` for dependencies.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,policy_bots_core={level},github_gateway={level},policy_bot={level}",
            level = level.as_str().to_lowercase()
        ))
    })
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines.
/// * `level`: default verbosity when `RUST_LOG` is not set.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }

    #[test]
    fn test_default_filter_names_workspace_crates() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let rendered = env_filter(Level::DEBUG).to_string();
        assert!(rendered.contains("policy_bots_core=debug"));
        assert!(rendered.contains("github_gateway=debug"));
    }
}
