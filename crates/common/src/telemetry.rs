//! Tracing setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "votebattle=debug";

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. With `json` set,
/// events are emitted as JSON lines. Returns an error if a global subscriber
/// is already installed.
pub fn init_tracing(json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    if json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .try_init()
    }
}
