//! Tracing Setup
//!
//! Configures the `tracing` subscriber for structured, leveled logs.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: standard `EnvFilter` directives; defaults keep the
//!   tracker at `info` and quiet the HTTP/TLS internals.
//!
//! # Usage
//!
//! ```ignore
//! use order_tracker::infrastructure::telemetry;
//!
//! // Initialize at startup (returns guard that must be kept alive)
//! let _guard = telemetry::init();
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Guard tying subscriber lifetime to the program.
///
/// Currently a marker; kept so call sites do not change if a flushing
/// backend is added later.
pub struct TelemetryGuard {
    _private: (),
}

/// Initialize the tracing subscriber.
///
/// Returns a guard that must be kept alive for the duration of the
/// program.
#[must_use]
#[allow(clippy::expect_used)]
pub fn init() -> TelemetryGuard {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(
            "order_tracker=info"
                .parse()
                .expect("static directive 'order_tracker=info' is valid"),
        )
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        )
        .add_directive(
            "rustls=warn"
                .parse()
                .expect("static directive 'rustls=warn' is valid"),
        );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    TelemetryGuard { _private: () }
}
