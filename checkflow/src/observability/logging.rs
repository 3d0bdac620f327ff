//! Subscriber initialization.

use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, one object per event.
    Json,
    /// Human-readable multi-line output.
    #[default]
    Pretty,
}

/// Installs the global subscriber.
///
/// `RUST_LOG` selects levels and defaults to `info`. Only the first call
/// has any effect. A subscriber installed elsewhere beforehand is left in
/// place.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
        if let Err(err) = result {
            ::tracing::debug!(error = %err, "Global subscriber already set");
        }
    });
}
