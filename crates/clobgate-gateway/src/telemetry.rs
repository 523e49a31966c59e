//! Tracing subscriber setup.
//!
//! The filter comes from `RUST_LOG`, falling back to `info` for the
//! gateway crates and `warn` for everything else.

use clobgate_types::{GatewayError, Result};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "warn,clobgate=info";

#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber, as JSON lines or human-readable text.
///
/// # Errors
/// Returns [`GatewayError::Configuration`] if a global subscriber is
/// already installed.
pub fn init(json: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
    installed.map_err(|e| GatewayError::Configuration(format!("tracing init failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn second_init_is_an_error() {
        let _ = init(false);
        assert!(matches!(init(true), Err(GatewayError::Configuration(_))));
    }
}
