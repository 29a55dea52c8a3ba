//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fieldlog_core::config::{LogFormat, LoggingConfig};

static INIT: Once = Once::new();

/// Install the global subscriber.
///
/// `FIELDLOG_LOG` overrides `config.filter` when set, e.g.
/// `FIELDLOG_LOG=fieldlog_sync=debug,fieldlog_storage=warn`.
/// Idempotent: later calls (and calls after another subscriber was
/// installed) do nothing.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("FIELDLOG_LOG")
            .or_else(|_| EnvFilter::try_new(&config.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let result = match config.format {
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(fmt::layer().with_target(true))
                .with(filter)
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init(),
        };
        if result.is_err() {
            tracing::debug!("global subscriber already installed");
        }
    });
}
