//! Telemetry module providing tracing subscriber initialization.
//!
//! Log lines go to stderr so that stdout stays reserved for the rendered
//! benchmark report.
//!
//! # Usage
//!
//! ```no_run
//! use vdbench_core::telemetry;
//!
//! fn main() {
//!     // RUST_LOG wins when set; otherwise `info`, or `debug` when verbose.
//!     let _ = telemetry::init_subscriber(false);
//!     tracing::info!("Application started");
//! }
//! ```

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Default filter directive for the given verbosity.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Build the filter used by [`init_subscriber`].
///
/// `RUST_LOG` takes precedence. When it is unset or unparsable the filter
/// falls back to [`default_directive`].
pub fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}

/// Initialize a stderr subscriber with an environment filter.
///
/// Call this at application startup (not in the library). Returns an error
/// if a global subscriber has already been set.
pub fn init_subscriber(debug: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter(debug))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(debug)
        .with_line_number(debug)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "debug");
    }

    #[test]
    fn test_second_init_fails() {
        // Only one global subscriber may be installed per process; whichever
        // call comes second must report an error instead of panicking.
        let _ = init_subscriber(false);
        assert!(init_subscriber(true).is_err());
    }
}
