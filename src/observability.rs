// Observability Infrastructure
// Structured logging bootstrap for embedders of this crate. The engine
// itself only emits tracing events; wiring them to an output is the host
// application's call, and this module gives it the standard setup.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging and tracing infrastructure with default verbosity.
/// This should be called once at application startup.
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    // Determine the filter level based on flags
    let filter_level = if quiet {
        // In quiet mode, suppress everything except errors
        EnvFilter::new("error")
    } else if verbose {
        // In verbose mode, show debug info for loadstats and info for others
        EnvFilter::new("loadstats=debug,info")
    } else {
        // Default: warnings and errors for loadstats, only errors for
        // dependencies. SLA verdict flips surface as warnings, so they stay
        // visible without per-iteration spam.
        EnvFilter::new("loadstats=warn,error")
    };

    // Quiet takes precedence over the environment variable; otherwise
    // RUST_LOG overrides the flag-based default.
    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("loadstats observability initialized");
            }
            Ok(())
        }
        Err(_) => {
            // Already initialized, which is fine in test environments
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logging_level() {
        let filter_str = "loadstats=warn,error";
        assert!(EnvFilter::try_new(filter_str).is_ok());
    }

    #[test]
    fn test_verbose_logging_level() {
        let filter_str = "loadstats=debug,info";
        assert!(EnvFilter::try_new(filter_str).is_ok());
    }

    #[test]
    fn test_quiet_logging_level() {
        assert!(EnvFilter::try_new("error").is_ok());
    }

    #[test]
    fn test_double_initialization_is_tolerated() {
        assert!(init_logging_with_level(false, true).is_ok());
        assert!(init_logging_with_level(false, true).is_ok());
    }
}
