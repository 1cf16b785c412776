//! Console logging for the CLI.
//!
//! Logs go to stderr so minted IDs on stdout stay pipeable. Filtering follows
//! `RUST_LOG` and defaults to `info`.

/// Installs the global `tracing` subscriber. No-op without the `tracing`
/// feature.
pub fn init_telemetry() {
    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_timer(fmt::time::ChronoLocal::rfc_3339())
                    .with_file(true),
            )
            .init();
    }
}
