//! Log subscriber setup

use crate::config::{ColorChoice, Verbosity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that overrides the `-v`/`-q` level
pub const LOG_ENV: &str = "PDIFF_LOG";

/// Filter from `PDIFF_LOG`, falling back to the verbosity's default
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()))
}

/// Install the global subscriber, writing to stderr.
///
/// A second call is a no-op.
pub fn init(verbosity: Verbosity, color: ColorChoice) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(color.should_color())
                .with_target(verbosity.is_debug()),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_falls_back_to_verbosity() {
        // PDIFF_LOG is not set in the test environment
        if std::env::var_os(LOG_ENV).is_none() {
            let filter = env_filter(Verbosity::Verbose);
            assert!(filter.to_string().contains("pdiff=info"));
        }
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(Verbosity::Quiet, ColorChoice::Never);
        init(Verbosity::Debug, ColorChoice::Never);
    }
}
