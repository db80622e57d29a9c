//! Telemetry utilities: event timing and logging setup.

use crate::config::LogFormat;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Guard for timing event execution and recording metrics.
///
/// Records event latency when dropped.
pub struct EventTimer {
    event: &'static str,
    start: Instant,
}

impl EventTimer {
    /// Start timing an event.
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            start: Instant::now(),
        }
    }
}

impl Drop for EventTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_event(self.event, duration);
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

/// Standardized span constructors.
pub mod spans {
    use parley_proto::ConnectionId;
    use tracing::{Span, info_span};

    /// Span covering one live connection.
    pub fn connection(conn: ConnectionId, identity: &str) -> Span {
        info_span!("connection", conn = %conn, identity = %identity)
    }
}
