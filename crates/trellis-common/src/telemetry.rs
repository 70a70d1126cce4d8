//! Telemetry initialization for structured logging
//!
//! Provider extension binaries log as JSON through `tracing`, with the
//! filter taken from `RUST_LOG` when set. Metrics and trace export are out
//! of scope for the extensions; the host manager owns observability.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,trellis=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize the tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Initialize JSON structured logging for an extension binary.
///
/// Fails when a global subscriber is already installed, so call it once,
/// first thing in `main`.
pub fn init_telemetry() -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_quiets_http_internals() {
        assert!(DEFAULT_FILTER.contains("hyper=warn"));
        assert!(DEFAULT_FILTER.contains("tower=warn"));
    }

    #[test]
    fn repeated_initialization_fails() {
        // The second call must report SubscriberInit rather than silently
        // replacing the global subscriber.
        let _ = init_telemetry();
        let second = init_telemetry();
        assert!(matches!(second, Err(TelemetryError::SubscriberInit(_))));
    }
}
